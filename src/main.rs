mod cmd;
mod layout;
mod pipeline;
mod progress;
mod stats;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use pipeline::ChunkBounds;

#[derive(Parser)]
#[command(name = "mash")]
#[command(about = "Measure cross-snapshot storage dedup of content-defined-chunked container images")]
#[command(version)]
struct Cli {
    /// Output the report as JSON (optionally to a file)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "-")]
    json: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, unpack and rebuild every tag, then report dedup statistics
    Measure {
        /// Image to measure, without a tag (e.g. docker.io/library/nginx)
        image: String,

        #[command(flatten)]
        common: CommonArgs,

        /// CDC image builder command invoked to rebuild each rootfs
        #[arg(long, default_value = "puzzlefs")]
        builder: String,

        /// Minimum chunk size passed to the builder
        #[arg(long, value_name = "min")]
        min: Option<u32>,

        /// Average chunk size passed to the builder
        #[arg(long, value_name = "avg")]
        avg: Option<u32>,

        /// Maximum chunk size passed to the builder
        #[arg(long, value_name = "max")]
        max: Option<u32>,

        /// Keep unpacked rootfs directories after rebuilding
        #[arg(long)]
        keep: bool,
    },

    /// Report dedup statistics for an already-populated working directory
    Report {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Snapshot tags to analyze
    #[arg(short, long, value_delimiter = ',', required = true)]
    tags: Vec<String>,

    /// Working directory holding the plain and chunked layouts
    #[arg(short, long, default_value = "./mash-work")]
    workdir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Measure {
            image,
            common,
            builder,
            min,
            avg,
            max,
            keep,
        } => {
            let bounds = chunk_bounds(min, avg, max)?;
            cmd::measure::run(
                &image,
                &common.tags,
                &common.workdir,
                bounds,
                &builder,
                keep,
                cli.json.as_deref(),
            )
        }
        Commands::Report { common } => {
            cmd::report::run(&common.workdir, &common.tags, cli.json.as_deref())
        }
    }
}

/// All three bounds together, or none (the builder's defaults apply).
fn chunk_bounds(min: Option<u32>, avg: Option<u32>, max: Option<u32>) -> Result<Option<ChunkBounds>> {
    match (min, avg, max) {
        (Some(min), Some(avg), Some(max)) => Ok(Some(ChunkBounds::new(min, avg, max)?)),
        (None, None, None) => Ok(None),
        _ => anyhow::bail!("--min, --avg and --max must be given together"),
    }
}
