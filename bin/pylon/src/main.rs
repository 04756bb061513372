mod cli;
mod launcher;
mod utils;

use clap::Parser;
use cli::Opts;
use tracing_subscriber::EnvFilter;

fn main() {
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(err)
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            err.exit()
        }
        Err(err) => {
            // missing or invalid configuration
            let _ = err.print();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime");

    if let Err(err) = runtime.block_on(launcher::launch(opts)) {
        eprintln!("pylon failed to start: {err:#}");
        std::process::exit(1);
    }
}
