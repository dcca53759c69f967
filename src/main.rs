use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tu58em::config::{Args, Config, Flags};
use tu58em::supervisor::Supervisor;
use tu58em::tape::TapeStore;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.background {
        "warn,tu58em=info"
    } else if args.debug {
        "info,tu58em=trace"
    } else if args.verbose {
        "info,tu58em=debug"
    } else {
        "warn,tu58em=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let send_init = !args.nosync;
    let flags = Flags::new(args.verbose, args.debug, send_init);
    let units = args.units();
    if units.is_empty() {
        anyhow::bail!("no tape units specified (-r/-w/-c/-i/-z): nothing to serve");
    }
    let config = Config::from_args(args);

    let mut tapes = TapeStore::new();
    for (path, mode) in &units {
        let unit = tapes
            .open(path, *mode)
            .with_context(|| format!("opening tape image {path}"))?;
        tracing::info!(unit, path, "tape unit ready");
    }

    tracing::info!(port = %config.port, baud = config.baud, "starting TU58 emulator");

    let supervisor = Supervisor::new(config, flags);
    supervisor.run(tapes)
}
