//! OS resource sampling feeding the monitoring subsystem (spec.md §4.4.1,
//! §7). Linux-specific; every read degrades to a documented fallback
//! constant instead of failing, since a stalled sampler must never take the
//! monitor server down.
//!
//! Grounded in `monitor_server.cpp`'s `MonitorThread::CheckCpuUsage` (jiffy
//! deltas from `/proc/stat`) and `CheckBandwidth` (link speed per
//! interface), translated from the original's `ETHTOOL_GSET` ioctl call to
//! the equivalent `/sys/class/net/<if>/speed` file the kernel exposes for
//! the same value without needing raw socket ioctls.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

const CPU_SAMPLE_HISTORY: usize = 6;
const FALLBACK_CORES: u32 = 1;
const FALLBACK_FREQ_GHZ: f64 = 1.0;
const FALLBACK_WLAN_KBPS: f64 = 30_000.0;

/// Running average of recent CPU usage samples, plus the machine facts that
/// only need to be read once (cores, clock frequency).
pub struct ResourceSampler {
    cores: u32,
    freq_ghz: f64,
    last_jiffies: Option<CpuJiffies>,
    usage_history: VecDeque<f64>,
}

#[derive(Clone, Copy)]
struct CpuJiffies {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            cores: read_core_count().unwrap_or(FALLBACK_CORES),
            freq_ghz: read_cpu_freq_ghz().unwrap_or(FALLBACK_FREQ_GHZ),
            last_jiffies: None,
            usage_history: VecDeque::with_capacity(CPU_SAMPLE_HISTORY),
        }
    }

    pub fn cores(&self) -> u32 {
        self.cores
    }

    pub fn freq_ghz(&self) -> f64 {
        self.freq_ghz
    }

    /// Reads `/proc/stat` and folds the new sample into the rolling
    /// average. A counter that went backwards (can happen across a
    /// `/proc` read race) is treated as "no new data" rather than
    /// poisoning the average with a negative delta.
    pub fn sample_cpu_usage(&mut self) -> f64 {
        if let Some(jiffies) = read_cpu_jiffies() {
            if let Some(prev) = self.last_jiffies {
                if let Some(usage) = usage_delta(prev, jiffies) {
                    if self.usage_history.len() == CPU_SAMPLE_HISTORY {
                        self.usage_history.pop_front();
                    }
                    self.usage_history.push_back(usage);
                }
            }
            self.last_jiffies = Some(jiffies);
        }

        if self.usage_history.is_empty() {
            0.0
        } else {
            self.usage_history.iter().sum::<f64>() / self.usage_history.len() as f64
        }
    }

    /// Rolling CPU-usage average as of the last [`sample_cpu_usage`] call,
    /// without taking a new reading. Used by callers that sample on a
    /// separate timer and only need the latest value on demand.
    ///
    /// [`sample_cpu_usage`]: Self::sample_cpu_usage
    pub fn current_usage(&self) -> f64 {
        if self.usage_history.is_empty() {
            0.0
        } else {
            self.usage_history.iter().sum::<f64>() / self.usage_history.len() as f64
        }
    }

    /// Highest advertised link speed across this host's network
    /// interfaces, in kbps (spec.md §4.4.1: `eth*` via sysfs, `wlan*`
    /// hard-coded since wireless drivers rarely populate `speed`).
    pub fn sample_bandwidth_kbps(&self) -> f64 {
        read_network_interfaces()
            .into_iter()
            .map(|name| interface_speed_kbps(&name))
            .fold(0.0, f64::max)
    }

    /// Resident set size in bytes, read from `/proc/self/status`. Kept
    /// locally for diagnostics; never placed on the wire (spec.md §4.4.1).
    pub fn resident_memory_bytes(&self) -> Option<u64> {
        read_proc_self_status_field("VmRSS:").map(|kb| kb * 1024)
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn usage_delta(prev: CpuJiffies, next: CpuJiffies) -> Option<f64> {
    let d_user = next.user.checked_sub(prev.user)?;
    let d_nice = next.nice.checked_sub(prev.nice)?;
    let d_system = next.system.checked_sub(prev.system)?;
    let d_idle = next.idle.checked_sub(prev.idle)?;

    let busy = (d_user + d_nice + d_system) as f64;
    let total = busy + d_idle as f64;
    if total <= 0.0 {
        None
    } else {
        Some(busy / total)
    }
}

fn read_cpu_jiffies() -> Option<CpuJiffies> {
    let contents = fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().find(|l| l.starts_with("cpu "))?;
    let mut fields = line.split_whitespace().skip(1);
    Some(CpuJiffies {
        user: fields.next()?.parse().ok()?,
        nice: fields.next()?.parse().ok()?,
        system: fields.next()?.parse().ok()?,
        idle: fields.next()?.parse().ok()?,
    })
}

fn read_core_count() -> Option<u32> {
    std::thread::available_parallelism()
        .ok()
        .map(|n| n.get() as u32)
}

fn read_cpu_freq_ghz() -> Option<f64> {
    let khz: f64 = fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq")
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(khz / 1_000_000.0)
}

fn read_network_interfaces() -> Vec<String> {
    let entries = match fs::read_dir("/sys/class/net") {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name != "lo")
        .collect()
}

fn interface_speed_kbps(name: &str) -> f64 {
    if name.starts_with("wlan") {
        return FALLBACK_WLAN_KBPS;
    }
    if !name.starts_with("eth") {
        return 0.0;
    }

    let path = Path::new("/sys/class/net").join(name).join("speed");
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|mbps| *mbps > 0.0)
        .map(|mbps| mbps * 100.0)
        .unwrap_or(0.0)
}

fn read_proc_self_status_field(label: &str) -> Option<u64> {
    let contents = fs::read_to_string("/proc/self/status").ok()?;
    let line = contents.lines().find(|l| l.starts_with(label))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_delta_ignores_regressed_counters() {
        let prev = CpuJiffies { user: 10, nice: 0, system: 5, idle: 100 };
        let regressed = CpuJiffies { user: 9, nice: 0, system: 5, idle: 100 };
        assert!(usage_delta(prev, regressed).is_none());
    }

    #[test]
    fn usage_delta_computes_busy_fraction() {
        let prev = CpuJiffies { user: 10, nice: 0, system: 5, idle: 100 };
        let next = CpuJiffies { user: 20, nice: 0, system: 10, idle: 120 };
        let usage = usage_delta(prev, next).unwrap();
        assert!((usage - (15.0 / 35.0)).abs() < 1e-9);
    }

    #[test]
    fn sampler_falls_back_when_files_are_unreadable() {
        let sampler = ResourceSampler {
            cores: FALLBACK_CORES,
            freq_ghz: FALLBACK_FREQ_GHZ,
            last_jiffies: None,
            usage_history: VecDeque::new(),
        };
        assert_eq!(sampler.cores(), 1);
        assert_eq!(sampler.freq_ghz(), 1.0);
    }

    #[test]
    fn wlan_interfaces_use_the_fixed_estimate() {
        assert_eq!(interface_speed_kbps("wlan0"), FALLBACK_WLAN_KBPS);
    }
}
