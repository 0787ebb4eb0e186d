use anyhow::{Context, Result};
use clap::Parser;
use pkgre_morpher::{logging, Config, MorpherServer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "morpher")]
#[command(version, about = "HTTP server for morphing go get requests")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/morpher.toml")]
    config: PathBuf,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    // Help and version displays exit 0, argument errors exit 1
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;

    config.validate().context("Error while config validation")?;
    logging::init(&config.log, cli.no_color)?;

    info!(
        "Starting PkgRE Morpher Server {} with {} workers...",
        env!("CARGO_PKG_VERSION"),
        config.main.procs
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.main.procs)
        .enable_all()
        .build()
        .context("Can't build async runtime")?;

    runtime.block_on(MorpherServer::new(Arc::new(config)).run())
}
