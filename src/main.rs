//! Gateway between a DAPNET paging backend and a locally attached POCSAG
//! modem/repeater.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dapnet_pocsag_gateway::config::Config;
use dapnet_pocsag_gateway::supervisor::Supervisor;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG_PATH: &str = "/etc/dapnet-pocsag-gateway.ini";

#[derive(Parser)]
#[command(name = "dapnet-pocsag-gateway", disable_version_flag = true)]
struct Args {
    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Hex-dump raw upstream/downstream traffic at trace level, overriding
    /// the ini file's `DAPNET.Debug` setting (§10.2, §10.4).
    #[arg(long = "debug")]
    debug: bool,

    /// Path to the .ini configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    ini_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("DAPNETGateway v{VERSION}");
        return ExitCode::SUCCESS;
    }

    let mut config = match Config::load(&args.ini_file) {
        Ok(config) => config,
        Err(e) => {
            // Logging isn't configured yet (that depends on the config we
            // just failed to load), so this goes straight to stderr.
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if args.debug {
        config.dapnet.debug = true;
    }

    init_tracing(config.log.display_level, config.dapnet.debug);

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let mut supervisor = Supervisor::new(config);
    match supervisor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Map the INI file's numeric `DisplayLevel` (0 = errors only .. 4 =
/// everything, matching the original's four-level scheme) onto a
/// `tracing` filter, with `RUST_LOG` taking precedence when set. `debug`
/// (from `--debug` or `DAPNET.Debug`) forces `trace` regardless of
/// `display_level`, matching the original's raw-traffic dump gate (§10.2).
fn init_tracing(display_level: u32, debug: bool) {
    let default_directive = if debug {
        "trace"
    } else {
        match display_level {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
