//! Positional-argument fallback used when no INI configuration file is
//! present, mirroring the original `main()` argv parsing in
//! `server_runner.cpp` / `client_runner.cpp`.

/// `<exe> <mcAddr> <mcPort> <svcPort> <monPort> [presence <prAddr> <prPort>] [daemon]`
///
/// The original accepts this as bare positionals with an optional `presence`
/// keyword section, a grammar [`clap`]'s derive positionals don't express
/// directly, so `parse_positional` below walks the slice by hand; `clap` is
/// reserved for the binaries' real `--flag` surface (e.g. `--config`).
#[derive(Debug)]
pub struct ServerArgs {
    pub mc_address: String,
    pub mc_port: u16,
    pub svc_port: u16,
    pub mon_port: u16,
    pub presence_address: Option<String>,
    pub presence_port: Option<u16>,
    pub exec_path: Option<String>,
    pub daemon: bool,
}

/// `<exe> <mcAddr> <mcPort> [presence <prAddr> <prPort>] [daemon]`
#[derive(Debug)]
pub struct ClientArgs {
    pub mc_address: String,
    pub mc_port: u16,
    pub presence_address: Option<String>,
    pub presence_port: Option<u16>,
    pub daemon: bool,
}

impl ServerArgs {
    /// Parses the original positional form
    /// `<mcAddr> <mcPort> <svcPort> <monPort> [presence <prAddr> <prPort>] [daemon]`
    /// out of raw process arguments, since the original accepts bare
    /// positionals rather than `--flag` syntax.
    pub fn parse_positional(args: &[String]) -> Option<Self> {
        if args.len() < 4 {
            return None;
        }
        let mc_address = args[0].clone();
        let mc_port = args[1].parse().ok()?;
        let svc_port = args[2].parse().ok()?;
        let mon_port = args[3].parse().ok()?;

        let rest = &args[4..];
        let (presence_address, presence_port, rest) = take_presence(rest)?;
        let daemon = rest.first().is_some_and(|arg| arg == "daemon");

        Some(Self {
            mc_address,
            mc_port,
            svc_port,
            mon_port,
            presence_address,
            presence_port,
            exec_path: None,
            daemon,
        })
    }
}

impl ClientArgs {
    /// Parses `<mcAddr> <mcPort> [presence <prAddr> <prPort>] [daemon]`.
    pub fn parse_positional(args: &[String]) -> Option<Self> {
        if args.len() < 2 {
            return None;
        }
        let mc_address = args[0].clone();
        let mc_port = args[1].parse().ok()?;

        let rest = &args[2..];
        let (presence_address, presence_port, rest) = take_presence(rest)?;
        let daemon = rest.first().is_some_and(|arg| arg == "daemon");

        Some(Self { mc_address, mc_port, presence_address, presence_port, daemon })
    }
}

/// Consumes a leading `presence <addr> <port>` triple if present, returning
/// the parsed fields plus whatever argument slice remains.
fn take_presence(args: &[String]) -> Option<(Option<String>, Option<u16>, &[String])> {
    if args.first().map(String::as_str) == Some("presence") {
        if args.len() < 3 {
            return None;
        }
        let address = args[1].clone();
        let port = args[2].parse().ok()?;
        Some((Some(address), Some(port), &args[3..]))
    } else {
        Some((None, None, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn server_parses_minimal_positionals() {
        let args = ServerArgs::parse_positional(&strings(&["224.1.1.11", "9901", "9902", "9903"])).unwrap();
        assert_eq!(args.mc_port, 9901);
        assert_eq!(args.svc_port, 9902);
        assert_eq!(args.mon_port, 9903);
        assert!(args.presence_address.is_none());
        assert!(!args.daemon);
    }

    #[test]
    fn server_parses_presence_and_daemon() {
        let args = ServerArgs::parse_positional(&strings(&[
            "224.1.1.11",
            "9901",
            "9902",
            "9903",
            "presence",
            "stun.example.com",
            "3478",
            "daemon",
        ]))
        .unwrap();
        assert_eq!(args.presence_address.as_deref(), Some("stun.example.com"));
        assert_eq!(args.presence_port, Some(3478));
        assert!(args.daemon);
    }

    #[test]
    fn client_parses_minimal_positionals() {
        let args = ClientArgs::parse_positional(&strings(&["224.1.1.11", "9901"])).unwrap();
        assert_eq!(args.mc_port, 9901);
        assert!(!args.daemon);
    }

    #[test]
    fn too_few_arguments_is_rejected() {
        assert!(ServerArgs::parse_positional(&strings(&["224.1.1.11", "9901"])).is_none());
        assert!(ClientArgs::parse_positional(&strings(&["224.1.1.11"])).is_none());
    }
}
