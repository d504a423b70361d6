//! Typed configuration for each runner, built from either an INI file
//! (§6.1) or the positional-argument fallback (§6.2).

use std::net::Ipv4Addr;
use std::path::Path;

use rama_error::{ErrorContext, OpaqueError};

use crate::cli::{ClientArgs, ServerArgs};
use crate::ini::Ini;

/// An optional STUN presence rendezvous, out of scope for the core
/// protocol but carried through since the original config format has it.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub multicast_address: Ipv4Addr,
    pub multicast_port: u16,
    pub service_port: u16,
    pub service_exec_path: String,
    pub monitor_port: u16,
    pub presence: Option<Presence>,
    pub run_as_daemon: bool,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub multicast_address: Ipv4Addr,
    pub multicast_port: u16,
    pub monitor_port: u16,
    pub presence: Option<Presence>,
    pub run_as_daemon: bool,
    pub self_discovery_enabled: bool,
}

impl ServerConfig {
    /// Loads `path` if it exists; falls back to `args` (the positional CLI
    /// form) when it does not (§6.2: "fallback when no INI file is found").
    pub fn load(path: &Path, args: &ServerArgs) -> Result<Self, OpaqueError> {
        match Ini::load(path).context("read server INI file")? {
            Some(ini) => Ok(Self::from_ini(&ini)),
            None => Self::from_args(args),
        }
    }

    fn from_ini(ini: &Ini) -> Self {
        let presence_address = ini.get_string("presence", "address", "");
        Self {
            multicast_address: parse_ipv4_or_default(&ini.get_string("multicast", "address", "224.1.1.11")),
            multicast_port: ini.get_integer("multicast", "port", 9901) as u16,
            service_port: ini.get_integer("service", "port", 9902) as u16,
            service_exec_path: ini.get_string("service", "exec-path", ""),
            monitor_port: ini.get_integer("monitor", "port", 9903) as u16,
            presence: (!presence_address.is_empty()).then(|| Presence {
                address: presence_address,
                port: ini.get_integer("presence", "port", 0) as u16,
            }),
            run_as_daemon: ini.get_boolean("run", "run-as-damon", false),
        }
    }

    fn from_args(args: &ServerArgs) -> Result<Self, OpaqueError> {
        Ok(Self {
            multicast_address: args
                .mc_address
                .parse()
                .with_context(|| format!("parse multicast address {}", args.mc_address))?,
            multicast_port: args.mc_port,
            service_port: args.svc_port,
            service_exec_path: args.exec_path.clone().unwrap_or_default(),
            monitor_port: args.mon_port,
            presence: args.presence_address.clone().map(|address| Presence {
                address,
                port: args.presence_port.unwrap_or(0),
            }),
            run_as_daemon: args.daemon,
        })
    }
}

impl ClientConfig {
    pub fn load(path: &Path, args: &ClientArgs) -> Result<Self, OpaqueError> {
        match Ini::load(path).context("read client INI file")? {
            Some(ini) => Ok(Self::from_ini(&ini)),
            None => Self::from_args(args),
        }
    }

    fn from_ini(ini: &Ini) -> Self {
        let presence_address = ini.get_string("presence", "address", "");
        Self {
            multicast_address: parse_ipv4_or_default(&ini.get_string("multicast", "address", "224.1.1.11")),
            multicast_port: ini.get_integer("multicast", "port", 9901) as u16,
            monitor_port: ini.get_integer("monitor", "port", 9903) as u16,
            presence: (!presence_address.is_empty()).then(|| Presence {
                address: presence_address,
                port: ini.get_integer("presence", "port", 0) as u16,
            }),
            run_as_daemon: ini.get_boolean("run", "run-as-damon", false),
            self_discovery_enabled: ini.get_boolean("multicast", "self-discovery-enabled", false),
        }
    }

    fn from_args(args: &ClientArgs) -> Result<Self, OpaqueError> {
        Ok(Self {
            multicast_address: args
                .mc_address
                .parse()
                .with_context(|| format!("parse multicast address {}", args.mc_address))?,
            multicast_port: args.mc_port,
            monitor_port: 9903,
            presence: args.presence_address.clone().map(|address| Presence {
                address,
                port: args.presence_port.unwrap_or(0),
            }),
            run_as_daemon: args.daemon,
            self_discovery_enabled: false,
        })
    }
}

fn parse_ipv4_or_default(value: &str) -> Ipv4Addr {
    value.parse().unwrap_or(Ipv4Addr::new(224, 1, 1, 11))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_reads_from_ini() {
        let ini = Ini::parse(
            "[multicast]\naddress=224.1.1.11\nport=9901\n\
             [service]\nport=9902\nexec-path=/usr/bin/renderer\n\
             [monitor]\nport=9903\n",
        )
        .unwrap();
        let config = ServerConfig::from_ini(&ini);
        assert_eq!(config.multicast_port, 9901);
        assert_eq!(config.service_port, 9902);
        assert_eq!(config.service_exec_path, "/usr/bin/renderer");
        assert!(config.presence.is_none());
    }

    #[test]
    fn client_config_reads_self_discovery_flag() {
        let ini = Ini::parse("[multicast]\naddress=224.1.1.11\nport=9901\nself-discovery-enabled=true\n").unwrap();
        let config = ClientConfig::from_ini(&ini);
        assert!(config.self_discovery_enabled);
    }
}
