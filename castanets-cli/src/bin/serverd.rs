//! `castanets-serverd`: standalone server daemon advertising service and
//! monitor ports over multicast discovery and launching requested services
//! through `--service-exec-path`.

use std::path::PathBuf;

use castanets_cli::callbacks::{standalone_get_capability, standalone_get_token, standalone_spawn, standalone_verify_token};
use castanets_cli::error::ErrorWithExitCode;
use castanets_cli::trace::init_tracing;
use castanets_config::{ServerArgs, ServerConfig};
use castanets_runner::{daemonize, ServerCallbacks, ServerRunner};
use clap::Parser;
use rama_error::BoxError;

#[derive(Debug, Parser)]
#[command(name = "castanets-serverd")]
#[command(version, about = "LAN-local service discovery and dispatch server")]
struct Cli {
    /// Path to an INI configuration file (§6.1). When absent, falls back to
    /// the legacy positional argument form below.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Legacy positional form:
    /// `<mcAddr> <mcPort> <svcPort> <monPort> [presence <addr> <port>] [daemon]`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    positional: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("exit with error ({}): {err}", err.exit_code());
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), ErrorWithExitCode> {
    let args = ServerArgs::parse_positional(&cli.positional);
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("castanets-server.ini"));

    let config = match args {
        Some(args) => ServerConfig::load(&config_path, &args).map_err(ErrorWithExitCode::config)?,
        None => {
            return Err(ErrorWithExitCode::config(
                "no --config file found and too few positional arguments given; expected \
                 <mcAddr> <mcPort> <svcPort> <monPort> [presence <addr> <port>] [daemon]",
            ));
        }
    };

    if config.run_as_daemon {
        #[cfg(target_family = "unix")]
        daemonize().map_err(|err| ErrorWithExitCode::new(1, err))?;
    }

    let callbacks = ServerCallbacks {
        get_token: standalone_get_token(),
        verify_token: standalone_verify_token(),
        get_capability: standalone_get_capability(),
        spawn: standalone_spawn(config.service_exec_path.clone()),
    };

    ServerRunner::new(config, callbacks).run().await.map_err(|err| ErrorWithExitCode::new(1, err))
}
