//! System capability check run before installing a backend

use serde::Serialize;
use std::path::Path;
use sysinfo::{Disks, System};
use tracing::{debug, info};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Minimum total RAM for any supported model
pub const MIN_RAM_GB: f64 = 2.0;
/// Minimum free disk space for a runtime plus a small model
pub const MIN_DISK_GB: f64 = 4.0;

/// Measured system resources
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub os_name: String,
    pub os_supported: bool,
    pub total_ram_bytes: u64,
    pub available_ram_bytes: u64,
    /// Free space on the disk holding the data directory, if it could be found
    pub free_disk_bytes: Option<u64>,
    pub cpu_cores: usize,
}

impl SystemReport {
    pub fn ram_gb(&self) -> f64 {
        self.total_ram_bytes as f64 / GIB
    }

    pub fn available_ram_gb(&self) -> f64 {
        self.available_ram_bytes as f64 / GIB
    }

    pub fn free_disk_gb(&self) -> Option<f64> {
        self.free_disk_bytes.map(|b| b as f64 / GIB)
    }

    /// Hard failures that must abort an installation
    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if !self.os_supported {
            failures.push(format!("Unsupported operating system: {}", self.os_name));
        }
        if self.ram_gb() < MIN_RAM_GB {
            failures.push(format!(
                "Insufficient RAM: {:.1}GB (minimum {:.0}GB)",
                self.ram_gb(),
                MIN_RAM_GB
            ));
        }
        if let Some(free) = self.free_disk_gb() {
            if free < MIN_DISK_GB {
                failures.push(format!(
                    "Insufficient disk space: {:.1}GB free (minimum {:.0}GB)",
                    free, MIN_DISK_GB
                ));
            }
        }
        failures
    }

    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }
}

pub struct SystemCheck;

impl SystemCheck {
    /// Measures memory, CPU, OS and free disk space for `data_dir`
    pub fn run(data_dir: &Path) -> SystemReport {
        let mut sys = System::new_all();
        sys.refresh_all();

        let os_name = System::long_os_version()
            .or_else(System::name)
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let os_supported = cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows"));

        let report = SystemReport {
            os_name,
            os_supported,
            total_ram_bytes: sys.total_memory(),
            available_ram_bytes: sys.available_memory(),
            free_disk_bytes: free_space_for(data_dir),
            cpu_cores: sys.cpus().len(),
        };

        info!(
            "System check: {:.1}GB RAM ({:.1}GB available), {} cores, {} free disk, {}",
            report.ram_gb(),
            report.available_ram_gb(),
            report.cpu_cores,
            report
                .free_disk_gb()
                .map(|gb| format!("{:.1}GB", gb))
                .unwrap_or_else(|| "unknown".to_string()),
            report.os_name
        );
        debug!("System report: {:?}", report);
        report
    }
}

/// Free space on the disk whose mount point is the longest prefix of `path`
fn free_space_for(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    let target = nearest_existing(path);
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    while !current.exists() {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}
