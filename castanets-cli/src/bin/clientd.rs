//! `castanets-clientd`: standalone client daemon that discovers servers,
//! keeps a persistent connection to each, and can either run until shutdown
//! or perform one `--dispatch` request and exit.

use std::path::PathBuf;

use castanets_cli::callbacks::{standalone_get_token, standalone_verify_token};
use castanets_cli::error::ErrorWithExitCode;
use castanets_cli::trace::init_tracing;
use castanets_config::{ClientArgs, ClientConfig};
use castanets_runner::{daemonize, ClientCallbacks, ClientRunner};
use clap::Parser;
use rama_error::BoxError;

#[derive(Debug, Parser)]
#[command(name = "castanets-clientd")]
#[command(version, about = "LAN-local service discovery and dispatch client")]
struct Cli {
    /// Path to an INI configuration file (§6.1).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Send a single `service-request://` to the best currently connected
    /// server, then exit, instead of running the long-lived daemon loop.
    #[arg(long, num_args = 1.., value_name = "ARG")]
    dispatch: Option<Vec<String>>,

    /// How long to wait for discovery and the token handshake to complete
    /// before giving up on `--dispatch` (seconds).
    #[arg(long, default_value_t = 5)]
    dispatch_wait_secs: u64,

    /// Legacy positional form: `<mcAddr> <mcPort> [presence <addr> <port>] [daemon]`.
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
    let args = ClientArgs::parse_positional(&cli.positional);
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("castanets-client.ini"));

    let config = match args {
        Some(args) => ClientConfig::load(&config_path, &args).map_err(ErrorWithExitCode::config)?,
        None => {
            return Err(ErrorWithExitCode::config(
                "no --config file found and too few positional arguments given; expected \
                 <mcAddr> <mcPort> [presence <addr> <port>] [daemon]",
            ));
        }
    };

    if config.run_as_daemon && cli.dispatch.is_none() {
        #[cfg(target_family = "unix")]
        daemonize().map_err(|err| ErrorWithExitCode::new(1, err))?;
    }

    let callbacks = ClientCallbacks { get_token: standalone_get_token(), verify_token: standalone_verify_token() };

    let runner = ClientRunner::bind(&config, callbacks).await.map_err(|err| ErrorWithExitCode::new(1, err))?;

    match cli.dispatch {
        Some(dispatch_args) => {
            let runner_handle = runner.clone();
            tokio::spawn(async move {
                let _ = runner_handle.run().await;
            });
            tokio::time::sleep(std::time::Duration::from_secs(cli.dispatch_wait_secs)).await;
            runner.dispatch(&dispatch_args).await.map_err(|err| ErrorWithExitCode::new(1, err))
        }
        None => runner.run().await.map_err(|err| ErrorWithExitCode::new(1, err)),
    }
}
