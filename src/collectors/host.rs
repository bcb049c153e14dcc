use crate::collectors::HostSummary;
use crate::model::{DiskStat, ProcessStat};
use sysinfo::{CpuExt, DiskExt, PidExt, ProcessExt, System, SystemExt};

/// Number of processes listed per ranking in the summary digest.
pub const TOP_PROCESSES: usize = 5;

/// Mount sources treated as pseudo filesystems and left out of the
/// disk table.
const PSEUDO_FS: [&str; 8] = [
    "tmpfs", "devtmpfs", "overlay", "squashfs", "ramfs", "proc", "sysfs", "autofs",
];

/// Takes one structured snapshot of the host. Everything here comes from
/// sysinfo, not from probe output; the summary digest never parses
/// captured command text.
pub fn collect_host(system: &mut System) -> HostSummary {
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_processes();
    system.refresh_disks_list();
    system.refresh_disks();

    let load = system.load_average();

    let mut processes: Vec<ProcessStat> = system
        .processes()
        .iter()
        .map(|(pid, p)| ProcessStat {
            pid: pid.as_u32(),
            name: p.name().to_string(),
            cpu_percent: p.cpu_usage() as f64,
            memory_bytes: p.memory() * 1024,
        })
        .collect();
    // Stable ranking: pid breaks ties so repeated runs agree.
    processes.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then(a.pid.cmp(&b.pid))
    });
    let top_by_cpu: Vec<ProcessStat> = processes.iter().take(TOP_PROCESSES).cloned().collect();
    processes.sort_by(|a, b| {
        b.memory_bytes
            .cmp(&a.memory_bytes)
            .then(a.pid.cmp(&b.pid))
    });
    let top_by_memory: Vec<ProcessStat> = processes.iter().take(TOP_PROCESSES).cloned().collect();

    let disks: Vec<DiskStat> = system
        .disks()
        .iter()
        .map(|d| {
            let total = d.total_space();
            DiskStat {
                device: d.name().to_string_lossy().to_string(),
                mount: d.mount_point().to_string_lossy().to_string(),
                file_system: String::from_utf8_lossy(d.file_system()).to_string(),
                used_bytes: total.saturating_sub(d.available_space()),
                total_bytes: total,
            }
        })
        .filter(is_real_device)
        .collect();

    HostSummary {
        host_name: system.host_name(),
        os_name: system.name(),
        os_version: system.os_version(),
        kernel_version: system.kernel_version(),
        cpu_brand: system.cpus().first().map(|c| c.brand().to_string()),
        cpu_core_count: system.cpus().len() as u32,
        uptime_seconds: system.uptime(),
        process_count: system.processes().len() as u64,
        load_avg_one: load.one,
        load_avg_five: load.five,
        load_avg_fifteen: load.fifteen,
        memory_used_bytes: system.used_memory() * 1024,
        memory_total_bytes: system.total_memory() * 1024,
        top_by_cpu,
        top_by_memory,
        disks,
    }
}

fn is_real_device(disk: &DiskStat) -> bool {
    let fs = disk.file_system.to_lowercase();
    !PSEUDO_FS.contains(&fs.as_str())
}
