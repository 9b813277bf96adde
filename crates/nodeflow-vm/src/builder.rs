//! Resource spec builder
//!
//! Pure functions assembling what gets submitted to the cloud API: the VM
//! spec, its bootstrap payload and credentials, availability set parameters
//! and interface tags. Nothing here performs I/O.

use crate::env::VmEnvironment;
use crate::error::{Result, VmError};
use crate::identity::InstanceId;
use crate::image::ImageMetadata;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nodeflow_cloud::{
    AvailabilitySetSpec, EphemeralDisk, OsDisk, OsProfile, OsType, Tags, VmSpec,
    WindowsCredentials,
};
use nodeflow_config::{CloudProperties, ResourcePool};
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

/// Tag carried by every resource this crate creates
pub const SYSTEM_TAG_KEY: &str = "user-agent";
pub const SYSTEM_TAG_VALUE: &str = "nodeflow";

/// Primary interface tag recording the availability set of its VM
pub const TAG_AVAILABILITY_SET: &str = "availability_set";
/// Primary interface tag recording the application gateway it is registered with
pub const TAG_APPLICATION_GATEWAY: &str = "application_gateway";

pub const MAX_AVAILABILITY_SET_NAME_LEN: usize = 80;
const KEPT_SUFFIX_LEN: usize = 40;

pub const DEFAULT_UPDATE_DOMAIN_COUNT: u32 = 5;
pub const DEFAULT_MANAGED_FAULT_DOMAIN_COUNT: u32 = 2;
pub const DEFAULT_UNMANAGED_FAULT_DOMAIN_COUNT: u32 = 3;

const WINDOWS_USERNAME_MAX_LEN: usize = 20;
const WINDOWS_COMPUTER_NAME_LEN: usize = 15;

pub fn system_tags() -> Tags {
    let mut tags = Tags::new();
    tags.insert(SYSTEM_TAG_KEY.to_string(), SYSTEM_TAG_VALUE.to_string());
    tags
}

/// Caller tags overlaid with the system tags
pub fn merge_system_tags(tags: &Tags) -> Tags {
    let mut merged = tags.clone();
    merged.extend(system_tags());
    merged
}

/// Tags of interface 0
pub fn primary_nic_tags(availability_set: Option<&str>, application_gateway: Option<&str>) -> Tags {
    let mut tags = system_tags();
    if let Some(name) = availability_set {
        tags.insert(TAG_AVAILABILITY_SET.to_string(), name.to_string());
    }
    if let Some(name) = application_gateway {
        tags.insert(TAG_APPLICATION_GATEWAY.to_string(), name.to_string());
    }
    tags
}

/// Availability set a VM joins, if any.
///
/// The resource pool wins over the environment's logical group. A VM placed
/// in an availability zone never joins an availability set.
pub fn availability_set_name(pool: &ResourcePool, env: &VmEnvironment) -> Option<String> {
    if pool.availability_zone.is_some() {
        return None;
    }
    pool.availability_set
        .clone()
        .or_else(|| env.group().map(truncate_availability_set_name))
}

/// Fit a logical group name into the availability set name limit.
///
/// Longer names become `az-<md5 hex>-<last 40 characters>`.
pub fn truncate_availability_set_name(name: &str) -> String {
    let len = name.chars().count();
    if len <= MAX_AVAILABILITY_SET_NAME_LEN {
        return name.to_string();
    }
    let digest = md5::compute(name.as_bytes());
    let suffix: String = name.chars().skip(len - KEPT_SUFFIX_LEN).collect();
    format!("az-{:x}-{}", digest, suffix)
}

pub fn availability_set_spec(
    name: &str,
    location: &str,
    pool: &ResourcePool,
    managed: bool,
) -> AvailabilitySetSpec {
    let default_fault_domains = if managed {
        DEFAULT_MANAGED_FAULT_DOMAIN_COUNT
    } else {
        DEFAULT_UNMANAGED_FAULT_DOMAIN_COUNT
    };
    AvailabilitySetSpec {
        name: name.to_string(),
        location: location.to_string(),
        tags: system_tags(),
        platform_update_domain_count: pool
            .platform_update_domain_count
            .unwrap_or(DEFAULT_UPDATE_DOMAIN_COUNT),
        platform_fault_domain_count: pool
            .platform_fault_domain_count
            .unwrap_or(default_fault_domains),
        managed,
    }
}

#[derive(Serialize)]
struct BootstrapPayload<'a> {
    registry: Registry<'a>,
    #[serde(rename = "instance-id", skip_serializing_if = "Option::is_none")]
    instance_id: Option<&'a str>,
    server: Server<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dns: Option<Dns<'a>>,
}

#[derive(Serialize)]
struct Registry<'a> {
    endpoint: &'a str,
}

#[derive(Serialize)]
struct Server<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Dns<'a> {
    nameserver: &'a [String],
}

/// Base64-encoded JSON handed to the guest agent on boot.
///
/// Linux guests find themselves by instance id under `server.name`. Windows
/// guests get their computer name there and the instance id under
/// `instance-id`.
pub fn bootstrap_payload(
    registry_endpoint: &str,
    instance_id: &str,
    dns: Option<&[String]>,
    computer_name: Option<&str>,
) -> Result<String> {
    let payload = BootstrapPayload {
        registry: Registry {
            endpoint: registry_endpoint,
        },
        instance_id: computer_name.map(|_| instance_id),
        server: Server {
            name: computer_name.unwrap_or(instance_id),
        },
        dns: dns.map(|nameserver| Dns { nameserver }),
    };
    let json = serde_json::to_string(&payload)
        .map_err(|e| VmError::Configuration(format!("failed to encode bootstrap payload: {}", e)))?;
    Ok(STANDARD.encode(json))
}

/// Throwaway administrator credentials for a Windows guest.
///
/// Operators never log in with these; guest users are provisioned separately.
pub fn generate_windows_credentials() -> WindowsCredentials {
    let username: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(WINDOWS_USERNAME_MAX_LEN)
        .collect();

    let mut password: Vec<char> = format!(
        "{}{}",
        Uuid::new_v4().hyphenated(),
        Uuid::new_v4().hyphenated().to_string().to_uppercase()
    )
    .chars()
    .collect();
    password.shuffle(&mut rand::thread_rng());

    WindowsCredentials {
        username,
        password: password.into_iter().collect(),
    }
}

/// Unique NetBIOS-compatible computer name
pub fn generate_computer_name() -> String {
    let random: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(WINDOWS_COMPUTER_NAME_LEN - 1)
        .collect();
    format!("w{}", random)
}

/// Inputs of [`vm_spec`] that vary per VM
pub struct VmSpecParams<'a> {
    pub identity: &'a InstanceId,
    pub location: &'a str,
    pub vm_size: &'a str,
    pub image: &'a ImageMetadata,
    pub os_disk: OsDisk,
    pub ephemeral_disk: Option<EphemeralDisk>,
    pub default_dns: Option<&'a [String]>,
    pub availability_zone: Option<String>,
}

/// Assemble the VM spec; diagnostics are attached separately
pub fn vm_spec(properties: &CloudProperties, params: VmSpecParams<'_>) -> Result<VmSpec> {
    let managed = params.identity.use_managed_disks();
    let instance_id = params.identity.to_string();

    let (os_profile, custom_data) = match params.image.os_type {
        OsType::Linux => (
            OsProfile::Linux {
                ssh_username: properties.ssh_user.clone(),
                ssh_public_key: properties.ssh_public_key.clone(),
            },
            bootstrap_payload(
                &properties.registry_endpoint,
                &instance_id,
                params.default_dns,
                None,
            )?,
        ),
        OsType::Windows => {
            let computer_name = generate_computer_name();
            let custom_data = bootstrap_payload(
                &properties.registry_endpoint,
                &instance_id,
                params.default_dns,
                Some(&computer_name),
            )?;
            (
                OsProfile::Windows {
                    credentials: generate_windows_credentials(),
                    computer_name,
                },
                custom_data,
            )
        }
    };

    Ok(VmSpec {
        name: params.identity.vm_name().to_string(),
        location: params.location.to_string(),
        tags: system_tags(),
        vm_size: params.vm_size.to_string(),
        os_disk: params.os_disk,
        ephemeral_disk: params.ephemeral_disk,
        image: params.image.image_source(managed),
        os_profile,
        custom_data,
        managed,
        diag_storage_uri: None,
        availability_zone: params.availability_zone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_cloud::ImageSource;

    fn decode(payload: &str) -> String {
        String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap()
    }

    fn properties() -> CloudProperties {
        CloudProperties::from_yaml(
            "resource_group_name: rg\nssh_user: vcap\nssh_public_key: ssh-rsa AAAA\nregistry_endpoint: http://registry:25777\n",
        )
        .unwrap()
    }

    fn os_disk() -> OsDisk {
        OsDisk {
            disk_name: "bosh-os-vm-1".to_string(),
            disk_uri: None,
            disk_size_gb: Some(30),
            disk_caching: "ReadWrite".to_string(),
            storage_account_type: None,
        }
    }

    #[test]
    fn test_short_group_name_is_kept() {
        let name = "a".repeat(80);
        assert_eq!(truncate_availability_set_name(&name), name);
    }

    #[test]
    fn test_long_group_name_is_truncated() {
        let name = format!("{}{}", "deployment-with-a-very-long-name-".repeat(3), "instance-group-web");
        assert!(name.len() > 80);

        let truncated = truncate_availability_set_name(&name);
        assert!(truncated.len() <= MAX_AVAILABILITY_SET_NAME_LEN);
        assert!(truncated.starts_with("az-"));
        assert!(truncated.ends_with(&name[name.len() - 40..]));
        assert_eq!(truncated, truncate_availability_set_name(&name));
        assert_ne!(truncated, truncate_availability_set_name(&format!("x{}", name)));
    }

    #[test]
    fn test_availability_set_name_precedence() {
        let env = VmEnvironment::with_group("env-group");
        let mut pool = ResourcePool::default();
        assert_eq!(availability_set_name(&pool, &env).as_deref(), Some("env-group"));

        pool.availability_set = Some("explicit".to_string());
        assert_eq!(availability_set_name(&pool, &env).as_deref(), Some("explicit"));

        let pool = ResourcePool::default();
        assert_eq!(availability_set_name(&pool, &VmEnvironment::default()), None);

        let pool = ResourcePool {
            availability_zone: Some("1".to_string()),
            ..Default::default()
        };
        assert_eq!(availability_set_name(&pool, &env), None);
    }

    #[test]
    fn test_availability_set_defaults() {
        let pool = ResourcePool::default();
        let spec = availability_set_spec("web", "eastus", &pool, true);
        assert_eq!(spec.platform_update_domain_count, 5);
        assert_eq!(spec.platform_fault_domain_count, 2);

        let spec = availability_set_spec("web", "eastus", &pool, false);
        assert_eq!(spec.platform_fault_domain_count, 3);

        let pool = ResourcePool {
            platform_update_domain_count: Some(10),
            platform_fault_domain_count: Some(1),
            ..Default::default()
        };
        let spec = availability_set_spec("web", "eastus", &pool, true);
        assert_eq!(spec.platform_update_domain_count, 10);
        assert_eq!(spec.platform_fault_domain_count, 1);
    }

    #[test]
    fn test_linux_bootstrap_payload() {
        let dns = vec!["168.63.129.16".to_string(), "8.8.8.8".to_string()];
        let payload = bootstrap_payload("http://registry", "agent_id:vm-1", Some(&dns), None).unwrap();
        assert_eq!(
            decode(&payload),
            r#"{"registry":{"endpoint":"http://registry"},"server":{"name":"agent_id:vm-1"},"dns":{"nameserver":["168.63.129.16","8.8.8.8"]}}"#
        );
    }

    #[test]
    fn test_windows_bootstrap_payload() {
        let payload = bootstrap_payload("http://registry", "agent_id:vm-1", None, Some("wabc")).unwrap();
        assert_eq!(
            decode(&payload),
            r#"{"registry":{"endpoint":"http://registry"},"instance-id":"agent_id:vm-1","server":{"name":"wabc"}}"#
        );
    }

    #[test]
    fn test_windows_credentials_complexity() {
        for _ in 0..50 {
            let credentials = generate_windows_credentials();
            assert!(credentials.username.len() <= 20);
            assert!(!credentials.username.contains('-'));

            let password = &credentials.password;
            assert!((8..=123).contains(&password.len()));
            let classes = [
                password.chars().any(|c| c.is_ascii_lowercase()),
                password.chars().any(|c| c.is_ascii_uppercase()),
                password.chars().any(|c| c.is_ascii_digit()),
                password.chars().any(|c| !c.is_ascii_alphanumeric()),
            ];
            assert!(classes.iter().filter(|c| **c).count() >= 3);
        }
    }

    #[test]
    fn test_computer_name() {
        let name = generate_computer_name();
        assert_eq!(name.len(), 15);
        assert_ne!(name, generate_computer_name());
    }

    #[test]
    fn test_linux_vm_spec() {
        let identity = InstanceId::managed("rg", "vm-1");
        let image = ImageMetadata {
            uri: "/subscriptions/s/images/stemcell".to_string(),
            os_type: OsType::Linux,
            image_reference: None,
            image_size_mb: None,
        };
        let spec = vm_spec(
            &properties(),
            VmSpecParams {
                identity: &identity,
                location: "eastus",
                vm_size: "Standard_D2s_v3",
                image: &image,
                os_disk: os_disk(),
                ephemeral_disk: None,
                default_dns: None,
                availability_zone: Some("2".to_string()),
            },
        )
        .unwrap();

        assert_eq!(spec.name, "vm-1");
        assert!(spec.managed);
        assert_eq!(spec.image, ImageSource::ImageId("/subscriptions/s/images/stemcell".to_string()));
        assert_eq!(spec.tags.get("user-agent").map(String::as_str), Some("nodeflow"));
        assert_eq!(spec.availability_zone.as_deref(), Some("2"));
        assert!(matches!(spec.os_profile, OsProfile::Linux { ref ssh_username, .. } if ssh_username == "vcap"));
        assert!(decode(&spec.custom_data).contains(r#""server":{"name":"agent_id:vm-1;resource_group_name:rg"}"#));
    }

    #[test]
    fn test_windows_vm_spec() {
        let identity = InstanceId::unmanaged("rg", "vm-1", "sa");
        let image = ImageMetadata {
            uri: "https://sa.blob/stemcell.vhd".to_string(),
            os_type: OsType::Windows,
            image_reference: None,
            image_size_mb: None,
        };
        let spec = vm_spec(
            &properties(),
            VmSpecParams {
                identity: &identity,
                location: "eastus",
                vm_size: "Standard_D2s_v3",
                image: &image,
                os_disk: os_disk(),
                ephemeral_disk: None,
                default_dns: None,
                availability_zone: None,
            },
        )
        .unwrap();

        assert!(!spec.managed);
        assert!(matches!(spec.image, ImageSource::ImageUri(_)));
        let OsProfile::Windows { computer_name, .. } = &spec.os_profile else {
            panic!("expected a Windows profile");
        };
        let payload = decode(&spec.custom_data);
        assert!(payload.contains(&format!(r#""server":{{"name":"{}"}}"#, computer_name)));
        assert!(payload.contains(r#""instance-id":"agent_id:vm-1;resource_group_name:rg;storage_account_name:sa""#));
    }

    #[test]
    fn test_merge_system_tags_overrides() {
        let mut tags = Tags::new();
        tags.insert("deployment".to_string(), "cf".to_string());
        tags.insert("user-agent".to_string(), "spoofed".to_string());

        let merged = merge_system_tags(&tags);
        assert_eq!(merged.get("deployment").map(String::as_str), Some("cf"));
        assert_eq!(merged.get("user-agent").map(String::as_str), Some("nodeflow"));
    }
}
