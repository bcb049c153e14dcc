pub mod host;

use crate::model::{DiskStat, ProcessStat};

#[derive(Debug, Clone)]
pub struct HostSummary {
    pub host_name: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_brand: Option<String>,
    pub cpu_core_count: u32,
    pub uptime_seconds: u64,
    pub process_count: u64,
    pub load_avg_one: f64,
    pub load_avg_five: f64,
    pub load_avg_fifteen: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub top_by_cpu: Vec<ProcessStat>,
    pub top_by_memory: Vec<ProcessStat>,
    pub disks: Vec<DiskStat>,
}
