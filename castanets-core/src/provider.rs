//! Client-side registry of candidate servers and the best-server scoring
//! function. Grounded in `service_provider.cpp`'s `ServiceProvider` class:
//! the scoring formulas below are copied verbatim (spec.md §9 calls this
//! out explicitly — they are an empirically tuned constant set, not an
//! algorithm to "improve").

use std::net::IpAddr;
use std::sync::Mutex;

use castanets_wire::monitor::MonitorSample;

use crate::model::{generate_key, ClientState, MonitorSnapshot, ServiceInfo, SharedClientState};

/// Entries expire if they never leave `ClientState::None` within this
/// window (`service_provider.cpp`'s `kExpiresMs`).
pub const EXPIRES_MS: u64 = 3 * 1000;

/// Registry of every server this client has heard about via discovery,
/// guarded by a single mutex as in the original (`ServiceProvider::mutex_`)
/// since entries are added/scored/removed far less often than they're read.
pub struct ServiceProvider {
    entries: Mutex<Vec<ServiceInfo>>,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Adds a newly discovered server, or refreshes its capability and
    /// freshness timestamp if already known (`AddServiceInfo`). Returns the
    /// key so the caller can start the background `ServiceClient` and hand
    /// back its `SharedClientState` for a brand-new entry, or `None` if the
    /// entry already existed and no new connection is needed.
    pub fn add_service_info(
        &self,
        address: IpAddr,
        service_port: u16,
        monitor_port: u16,
        capability: String,
        now_ms: u64,
    ) -> Option<(u64, std::sync::Arc<SharedClientState>)> {
        let key = generate_key(address, service_port as u32);
        let mut entries = self.entries.lock().expect("registry mutex poisoned");

        if let Some(existing) = entries.iter_mut().find(|e| e.key == key) {
            if existing.capability != capability {
                existing.capability = capability;
            }
            existing.last_update_ms = now_ms;
            return None;
        }

        let state = SharedClientState::new(ClientState::None);
        entries.push(ServiceInfo {
            key,
            address,
            service_port,
            monitor_port,
            capability,
            last_update_ms: now_ms,
            monitor: MonitorSnapshot::default(),
            state: state.clone(),
        });
        Some((key, state))
    }

    /// Snapshots every known entry's key, address and monitor port, for the
    /// periodic monitoring sweep (`ClientRunner::Run`'s per-tick
    /// `GetServiceInfo` loop, which probes every known server regardless of
    /// handshake state).
    pub fn snapshot_targets(&self) -> Vec<(u64, IpAddr, u16)> {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .iter()
            .map(|entry| (entry.key, entry.address, entry.monitor_port))
            .collect()
    }

    /// Folds a fresh monitor sample into the named entry
    /// (`UpdateServiceInfo`). Returns `false` if the key is unknown.
    pub fn update_service_info(&self, key: u64, rtt_ms: f64, sample: MonitorSample, now_ms: u64) -> bool {
        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        let Some(entry) = entries.iter_mut().find(|e| e.key == key) else {
            return false;
        };
        entry.monitor = MonitorSnapshot::with_rtt(rtt_ms, sample);
        entry.last_update_ms = now_ms;
        true
    }

    /// Drops entries that are `Disconnected`, or that have sat in `None`
    /// past `EXPIRES_MS` without completing the handshake
    /// (`InvalidateServiceList`).
    pub fn invalidate(&self, now_ms: u64) {
        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        entries.retain(|entry| {
            let state = entry.state.get();
            if state == ClientState::Disconnected {
                return false;
            }
            if state == ClientState::None && now_ms.saturating_sub(entry.last_update_ms) >= EXPIRES_MS {
                return false;
            }
            true
        });
    }

    /// Picks the lowest-scoring connected entry (`ChooseBestService` —
    /// lower is better: it is a composite "cost", not a quality rating).
    /// Address and port are returned by value so the caller is not left
    /// holding the registry lock while it acts on the choice.
    pub fn choose_best(&self) -> Option<(IpAddr, u16)> {
        let entries = self.entries.lock().expect("registry mutex poisoned");
        let mut best: Option<(f64, &ServiceInfo)> = None;

        for entry in entries.iter() {
            if !entry.is_connected() {
                continue;
            }
            let score = composite_score(&entry.monitor);
            match best {
                None => best = Some((score, entry)),
                Some((best_score, _)) if score < best_score => best = Some((score, entry)),
                _ => {}
            }
        }

        best.map(|(_, entry)| (entry.address, entry.service_port))
    }

    pub fn count(&self) -> usize {
        self.entries.lock().expect("registry mutex poisoned").len()
    }
}

impl Default for ServiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn composite_score(monitor: &MonitorSnapshot) -> f64 {
    let sample = &monitor.sample;
    (network_score(sample.bandwidth) + cpu_score(sample.freq, sample.usage, sample.cores)) / 2.0
        + rendering_score(monitor.rtt_ms)
}

/// `NetworkScore` — verbatim from `service_provider.cpp`.
fn network_score(bandwidth_kbps: f64) -> f64 {
    if bandwidth_kbps <= 0.0 {
        0.0
    } else {
        1.0 / (8770.0 * bandwidth_kbps.powf(-0.9))
    }
}

/// `CpuScore` — verbatim from `service_provider.cpp`.
fn cpu_score(freq_ghz: f64, usage: f64, cores: u32) -> f64 {
    if freq_ghz <= 0.0 || usage <= 0.0 || cores == 0 {
        0.0
    } else {
        let cores = cores as f64;
        (1.0 / (5.66 * freq_ghz.powf(-0.66))
            + 1.0 / (3.22 * usage.powf(-0.241))
            + 1.0 / (4.0 * cores.powf(-0.3)))
            / 3.0
    }
}

/// `RenderingScore` — verbatim from `service_provider.cpp`.
fn rendering_score(rtt_ms: f64) -> f64 {
    if rtt_ms <= 0.0 {
        0.0
    } else {
        0.77 * rtt_ms.powf(-0.43)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(usage: f64, cores: u32, bandwidth: f64, freq: f64) -> MonitorSample {
        MonitorSample { usage, cores, bandwidth, freq }
    }

    #[test]
    fn zero_inputs_score_zero() {
        assert_eq!(network_score(0.0), 0.0);
        assert_eq!(cpu_score(0.0, 0.0, 0), 0.0);
        assert_eq!(rendering_score(0.0), 0.0);
    }

    #[test]
    fn lower_score_wins_choose_best() {
        let registry = ServiceProvider::new();
        let addr_a: IpAddr = "10.0.0.1".parse().unwrap();
        let addr_b: IpAddr = "10.0.0.2".parse().unwrap();

        let (_key_a, state_a) = registry.add_service_info(addr_a, 9000, 9001, String::new(), 0).unwrap();
        let (key_b, state_b) = registry.add_service_info(addr_b, 9000, 9001, String::new(), 0).unwrap();
        state_a.set(ClientState::Connected);
        state_b.set(ClientState::Connected);

        // b has a much better (lower-cost) profile than a's untouched default.
        registry.update_service_info(key_b, 5.0, sample(0.1, 8, 1_000_000.0, 3.5), 0);

        let (best_addr, _) = registry.choose_best().unwrap();
        assert_eq!(best_addr, addr_b);
    }

    #[test]
    fn disconnected_entries_are_never_chosen() {
        let registry = ServiceProvider::new();
        let addr: IpAddr = "10.0.0.5".parse().unwrap();
        registry.add_service_info(addr, 9000, 9001, String::new(), 0);
        assert!(registry.choose_best().is_none());
    }

    #[test]
    fn invalidate_drops_stale_unconnected_entries() {
        let registry = ServiceProvider::new();
        let addr: IpAddr = "10.0.0.9".parse().unwrap();
        registry.add_service_info(addr, 9000, 9001, String::new(), 0);
        assert_eq!(registry.count(), 1);
        registry.invalidate(EXPIRES_MS + 1);
        assert_eq!(registry.count(), 0);
    }
}
