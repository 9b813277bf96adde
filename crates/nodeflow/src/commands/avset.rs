use nodeflow_vm::builder::truncate_availability_set_name;

pub fn handle(group: &str) {
    println!("{}", truncate_availability_set_name(group));
}
