//! Host statistics from `sysinfo`, the thermal zone and the interface list.

use std::fs;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;

use nix::ifaddrs::getifaddrs;
use sysinfo::{Disks, MINIMUM_CPU_UPDATE_INTERVAL, System};
use tracing::debug;

use crate::{DiskUsage, MemoryUsage, NetworkIdentity, SystemStats};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const PREFERRED_INTERFACES: [&str; 2] = ["wlan0", "eth0"];

pub struct HostStats {
    system: Mutex<System>,
    thermal_zone: PathBuf,
    disk_root: PathBuf,
}

impl Default for HostStats {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            disk_root: PathBuf::from("/"),
        }
    }
}

impl HostStats {
    pub fn new() -> Self {
        Self::default()
    }
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 { used / total * 100.0 } else { 0.0 }
}

fn memory_usage(total_bytes: u64, available_bytes: u64) -> MemoryUsage {
    let total = gib(total_bytes);
    let used = gib(total_bytes.saturating_sub(available_bytes));
    MemoryUsage {
        total,
        used,
        percent: percent(used, total),
    }
}

fn disk_usage(total_bytes: u64, available_bytes: u64) -> DiskUsage {
    let total = gib(total_bytes);
    let free = gib(available_bytes);
    let used = gib(total_bytes.saturating_sub(available_bytes));
    DiskUsage {
        total,
        free,
        used,
        percent: percent(used, total),
    }
}

fn parse_thermal(contents: &str) -> Option<f64> {
    contents
        .trim()
        .parse::<i64>()
        .ok()
        .map(|milli| milli as f64 / 1000.0)
}

fn disk_for(root: &Path) -> Option<DiskUsage> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == root)
        .map(|disk| disk_usage(disk.total_space(), disk.available_space()))
}

impl SystemStats for HostStats {
    fn network(&self) -> NetworkIdentity {
        let hostname = System::host_name().unwrap_or_else(|| "Unknown".to_string());

        let mut candidates = Vec::new();
        match getifaddrs() {
            Ok(addrs) => {
                for ifaddr in addrs {
                    let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in())
                    else {
                        continue;
                    };
                    let ip = *SocketAddrV4::from(*sin).ip();
                    if ip.is_loopback() {
                        continue;
                    }
                    candidates.push((ifaddr.interface_name.clone(), ip));
                }
            }
            Err(err) => debug!(error = %err, "getifaddrs failed"),
        }

        let address = PREFERRED_INTERFACES
            .iter()
            .find_map(|want| {
                candidates
                    .iter()
                    .find(|(name, _)| name == want)
                    .map(|(_, ip)| ip.to_string())
            })
            .or_else(|| candidates.first().map(|(_, ip)| ip.to_string()))
            .unwrap_or_else(|| "N/A".to_string());

        NetworkIdentity { hostname, address }
    }

    /// Two samples `MINIMUM_CPU_UPDATE_INTERVAL` apart.
    fn cpu_usage(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_usage();
        f64::from(system.global_cpu_usage())
    }

    fn cpu_temperature(&self) -> f64 {
        fs::read_to_string(&self.thermal_zone)
            .ok()
            .as_deref()
            .and_then(parse_thermal)
            .unwrap_or(0.0)
    }

    fn memory(&self) -> MemoryUsage {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        memory_usage(system.total_memory(), system.available_memory())
    }

    fn disk(&self) -> DiskUsage {
        disk_for(&self.disk_root).unwrap_or_else(|| {
            debug!(root = %self.disk_root.display(), "no disk mounted at root");
            DiskUsage::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reports_gib_used_from_available() {
        let mem = memory_usage(4 << 30, 3 << 30);
        assert!((mem.total - 4.0).abs() < 1e-9);
        assert!((mem.used - 1.0).abs() < 1e-9);
        assert!((mem.percent - 25.0).abs() < 1e-9);
        assert_eq!(memory_usage(0, 0).percent, 0.0);
    }

    #[test]
    fn disk_splits_used_and_free() {
        let disk = disk_usage(32 << 30, 24 << 30);
        assert!((disk.total - 32.0).abs() < 1e-9);
        assert!((disk.free - 24.0).abs() < 1e-9);
        assert!((disk.used - 8.0).abs() < 1e-9);
        assert!((disk.percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn thermal_is_milli_celsius() {
        assert_eq!(parse_thermal("48312\n"), Some(48.312));
        assert_eq!(parse_thermal("n/a"), None);
    }

    #[test]
    fn host_figures_stay_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let stats = HostStats {
            thermal_zone: dir.path().join("temp"),
            ..HostStats::default()
        };
        assert_eq!(stats.cpu_temperature(), 0.0);
        let usage = stats.cpu_usage();
        assert!((0.0..=100.0).contains(&usage), "{usage}");
        assert!(stats.memory().total > 0.0);
        assert!(!stats.network().hostname.is_empty());
    }
}
