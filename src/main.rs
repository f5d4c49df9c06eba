use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tilepack::bundle::{Args as BundleArgs, run_bundle};
use tilepack::download::{Args as DownloadArgs, run_download};
use tilepack::logging;
use tilepack::progress::Verbosity;
use tilepack::verify::{Args as VerifyArgs, run_verify};

#[derive(Parser)]
#[command(name = "tilepack")]
#[command(about = "Download, cache and bundle raster map tiles for offline use")]
#[command(version)]
struct Cli {
    /// Only print warnings, errors and summaries
    #[arg(short, long, global = true, action = ArgAction::SetTrue, conflicts_with = "verbose")]
    quiet: bool,

    /// Print a status line for every tile and debug logs
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch world tiles and, optionally, a country's tiles into the cache
    Download(DownloadArgs),
    /// Package the tile cache into a zip archive
    Bundle(BundleArgs),
    /// Decode every cached tile and remove the broken ones
    Verify(VerifyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    logging::init(verbosity);

    match cli.command {
        Commands::Download(args) => {
            run_download(args, verbosity).await?;
        }
        Commands::Bundle(args) => {
            run_bundle(args)?;
        }
        Commands::Verify(args) => {
            run_verify(args)?;
        }
    }

    Ok(())
}
