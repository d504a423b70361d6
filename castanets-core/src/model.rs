//! Shared data types used across the discovery, monitoring and service
//! subsystems. Grounded in `service_provider.h`'s `ServiceInfo` and
//! `monitor_client.h`'s `MonitorInfo`.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use castanets_wire::monitor::MonitorSample;

/// Connection lifecycle of a `ServiceClient`, mirrored from
/// `CServiceClient::State` (`service_client.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// TCP/TLS connected, token handshake not yet started.
    None,
    /// Sent our token, waiting for `verify-done://`.
    Connecting,
    /// Handshake complete; eligible for `ChooseBest`.
    Connected,
    /// Socket closed or verification failed; pending removal.
    Disconnected,
}

impl ClientState {
    fn to_u8(self) -> u8 {
        match self {
            ClientState::None => 0,
            ClientState::Connecting => 1,
            ClientState::Connected => 2,
            ClientState::Disconnected => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ClientState::Connecting,
            2 => ClientState::Connected,
            3 => ClientState::Disconnected,
            _ => ClientState::None,
        }
    }
}

/// Lock-free shared cell so the background connection task and the
/// registry can both observe/update state without a mutex on the hot path.
#[derive(Debug, Default)]
pub struct SharedClientState(AtomicU8);

impl SharedClientState {
    pub fn new(initial: ClientState) -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(initial.to_u8())))
    }

    pub fn get(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ClientState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// The monitoring facts a `ServiceInfo` entry carries: the wire sample plus
/// the round-trip time, which is measured locally by the monitor client and
/// never transmitted (`monitor_client.cpp`'s `ClientSocket::GenerateInfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorSnapshot {
    pub rtt_ms: f64,
    pub sample: MonitorSample,
}

impl MonitorSnapshot {
    pub fn with_rtt(rtt_ms: f64, sample: MonitorSample) -> Self {
        Self { rtt_ms, sample }
    }
}

/// Everything the registry tracks about one candidate server
/// (`service_provider.h`'s `ServiceInfo`).
pub struct ServiceInfo {
    pub key: u64,
    pub address: IpAddr,
    pub service_port: u16,
    pub monitor_port: u16,
    pub capability: String,
    pub last_update_ms: u64,
    pub monitor: MonitorSnapshot,
    pub state: Arc<SharedClientState>,
}

impl ServiceInfo {
    pub fn is_connected(&self) -> bool {
        self.state.get() == ClientState::Connected
    }
}

/// Generates the composite key `service_provider.cpp`'s `GenerateKey` packs
/// from a dotted-quad IPv4 address and a service index: the 32-bit address
/// in the high word, the index in the low word.
pub fn generate_key(address: IpAddr, index: u32) -> u64 {
    let packed = match address {
        IpAddr::V4(v4) => u32::from_be_bytes(v4.octets()),
        // IPv6 has no 4-octet packing in the original protocol; fold the
        // address down with a stable hash instead of refusing it outright.
        IpAddr::V6(v6) => {
            let octets = v6.octets();
            u32::from_be_bytes([octets[12], octets[13], octets[14], octets[15]])
        }
    };
    ((packed as u64) << 32) | index as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key_packs_ipv4_and_index() {
        let addr: IpAddr = "192.168.0.10".parse().unwrap();
        let key = generate_key(addr, 7);
        assert_eq!(key >> 32, 0xC0A8_000A);
        assert_eq!(key & 0xFFFF_FFFF, 7);
    }

    #[test]
    fn shared_state_round_trips() {
        let state = SharedClientState::new(ClientState::None);
        assert_eq!(state.get(), ClientState::None);
        state.set(ClientState::Connected);
        assert_eq!(state.get(), ClientState::Connected);
    }
}
