//! Host facts gathered before provisioning

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// Below this much free disk the container images are unlikely to fit
pub const MIN_DISK_AVAILABLE: u64 = 10 * 1024 * 1024 * 1024;

/// Below this much memory the stack tends to be OOM killed
pub const MIN_MEMORY_TOTAL: u64 = 1024 * 1024 * 1024;

/// Snapshot of the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostFacts {
    /// Hostname
    pub hostname: String,

    /// Distribution ID as sysinfo reports it
    pub distribution: String,

    /// Total memory in bytes
    pub memory_total: u64,

    /// Free space across all disks in bytes
    pub disk_available: u64,

    /// Number of CPU cores
    pub cpu_count: usize,
}

impl HostFacts {
    /// Collect host facts
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let disks = Disks::new_with_refreshed_list();
        let disk_available = disks.iter().map(|d| d.available_space()).sum();

        Self {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            distribution: System::distribution_id(),
            memory_total: sys.total_memory(),
            disk_available,
            cpu_count: sys.cpus().len(),
        }
    }

    /// Resource shortfalls worth telling the operator about
    pub fn shortfalls(&self) -> Vec<String> {
        let gib = |bytes: u64| bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let mut out = Vec::new();
        if self.memory_total > 0 && self.memory_total < MIN_MEMORY_TOTAL {
            out.push(format!(
                "Only {:.1} GiB of memory; the application stack may be killed under load",
                gib(self.memory_total)
            ));
        }
        if self.disk_available > 0 && self.disk_available < MIN_DISK_AVAILABLE {
            out.push(format!(
                "Only {:.1} GiB of free disk; pulling images may fail",
                gib(self.disk_available)
            ));
        }
        out
    }
}
