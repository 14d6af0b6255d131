// ABOUTME: Process entry point: CLI parsing, logging setup, and bootstrap of the listener
// ABOUTME: Kept separate from the library so the protocol engine has no CLI or process concerns

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use argh::FromArgs;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use httpfs::Config;

/// A small file-serving daemon over a reliable-datagram transport.
#[derive(FromArgs)]
struct CliArgs {
    /// enable verbose (debug-level) logging
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// UDP port to listen on (default: 8080)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// root directory file operations are confined to (default: current directory)
    #[argh(option, short = 'd')]
    dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args().len() <= 1 {
        eprintln!("usage: httpfsd [-v] [-p <port>] [-d <dir>]");
        return ExitCode::from(1);
    }

    let cli_args: CliArgs = argh::from_env();

    let max_level = if cli_args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(max_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let port = cli_args.port.unwrap_or(Config::DEFAULT_PORT);
    let dir = cli_args
        .dir
        .unwrap_or_else(|| PathBuf::from("."));

    let config = match Config::new(port, &dir, cli_args.verbose) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("failed to resolve root directory {}: {e}", dir.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = httpfs::listener::run(config).await {
        eprintln!("listener exited with an error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
