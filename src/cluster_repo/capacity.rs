// Approximate per-instance capacity, used when nodes must be synthesized from nodegroup sizing.

use crate::models::NodeCapacity;

const fn cap(cpu_cores: u32, memory_gib: u32, pods: u32) -> NodeCapacity {
    NodeCapacity {
        cpu_cores: cpu_cores as f64,
        memory_gib: memory_gib as f64,
        pods,
    }
}

/// Capacity for common EC2 instance types; unknown types get 2 cores / 4 GiB / 17 pods.
pub fn instance_capacity(instance_type: &str) -> NodeCapacity {
    match instance_type {
        "t3.micro" => cap(2, 1, 4),
        "t3.small" => cap(2, 2, 8),
        "t3.medium" => cap(2, 4, 17),
        "t3.large" => cap(2, 8, 35),
        "t3.xlarge" => cap(4, 16, 58),
        "t3.2xlarge" => cap(8, 32, 58),
        "m5.large" => cap(2, 8, 29),
        "m5.xlarge" => cap(4, 16, 58),
        "m5.2xlarge" => cap(8, 32, 58),
        "m5.4xlarge" => cap(16, 64, 234),
        "c5.large" => cap(2, 4, 29),
        "c5.xlarge" => cap(4, 8, 58),
        "c5.2xlarge" => cap(8, 16, 58),
        "c5.4xlarge" => cap(16, 32, 234),
        _ => cap(2, 4, 17),
    }
}
