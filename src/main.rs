//! stagesync binary entry point.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use stagesync::cli::{self, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let default_filter = if cli.debug {
        "stagesync=debug"
    } else {
        "stagesync=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli)
}
