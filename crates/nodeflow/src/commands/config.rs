use colored::Colorize;
use nodeflow_config::ResourcePool;
use std::path::PathBuf;

pub fn check(path: Option<PathBuf>, resource_pool: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", "Checking configuration...".blue());

    let path = match path {
        Some(path) => path,
        None => nodeflow_config::find_config_file()?,
    };
    println!("Configuration file: {}", path.display().to_string().cyan());

    let properties = match nodeflow_config::load_from(&path) {
        Ok(properties) => properties,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid configuration".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    println!(
        "  Resource group:      {}",
        properties.resource_group_name.cyan()
    );
    println!(
        "  Disks:               {}",
        if properties.use_managed_disks {
            "managed"
        } else {
            "unmanaged"
        }
    );
    println!(
        "  Security group:      {}",
        properties
            .default_security_group
            .as_deref()
            .unwrap_or("(not set)")
    );
    println!(
        "  Public IP timeout:   {} min",
        properties.pip_idle_timeout_in_minutes
    );
    println!("  Boot diagnostics:    {}", properties.debug_mode);
    println!(
        "  Lock directory:      {}",
        properties.lock.dir().display().to_string().cyan()
    );
    println!(
        "  Lock expiry:         {}s (gateway wait {}s)",
        properties.lock.expiry_secs, properties.lock.gateway_timeout_secs
    );

    if let Some(pool_path) = resource_pool {
        println!();
        println!(
            "Resource pool: {}",
            pool_path.display().to_string().cyan()
        );
        let content = std::fs::read_to_string(&pool_path)?;
        let result = ResourcePool::from_yaml(&content).and_then(|pool| pool.validate().map(|()| pool));
        match result {
            Ok(pool) => {
                println!("{}", "✓ Resource pool is valid".green().bold());
                println!(
                    "  Resource group:      {}",
                    pool.resource_group(&properties.resource_group_name).cyan()
                );
                if let Some(name) = &pool.availability_set {
                    println!("  Availability set:    {}", name.cyan());
                }
                if let Some(zone) = &pool.availability_zone {
                    println!("  Availability zone:   {}", zone.cyan());
                }
            }
            Err(e) => {
                eprintln!();
                eprintln!("{}", "✗ Invalid resource pool".red().bold());
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
