use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use tapfd::client;

/// Rendezvous point created by the tap server. Compiled in; no flags, no
/// config file.
const SOCKET_PATH: &str = "/tmp/tap_sock/tape81e9.sock";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = client::run(Path::new(SOCKET_PATH)) {
        eprintln!("{:#}", anyhow::Error::new(err));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
