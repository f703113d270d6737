use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use splitfs::fuse::{mount, SplitFuse};
use splitfs::hashes::HASH_NAMES;
use splitfs::split::{SplitFs, SplitOptions};

#[derive(Parser, Debug)]
#[command(
    name = "splitfs",
    version,
    about = "Read-only FUSE view of a directory in which every file appears pre-split into fixed-size chunk files"
)]
struct Args {
    /// Source directory to expose
    source_directory: PathBuf,
    /// Target mountpoint (an empty directory)
    mountpoint: PathBuf,

    /// Chunk size. Available units: B, KiB, MiB, GiB, TiB.
    #[arg(long = "chunk_size", default_value = "32MiB", value_parser = parse_chunk_size)]
    chunk_size: u64,

    /// Reflect files whose absolute source path matches this regex as plain,
    /// non-split files. The regex is not full-match; use ^ and $ to make it so.
    #[arg(long = "exclude_regexp")]
    exclude_regexp: Option<String>,

    /// Algorithm for filename hashes in chunk filenames.
    #[arg(long = "filename_hash", default_value = "sha256-b32")]
    filename_hash: String,

    /// Whether chunk filenames contain the total number of chunks of the
    /// overall file.
    #[arg(
        long = "filename_includes_total_chunks",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    filename_includes_total_chunks: bool,

    /// Whether chunk filenames contain the mtime of the overall file.
    #[arg(
        long = "filename_includes_mtime",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    filename_includes_mtime: bool,

    /// Use a privileged mount instead of fusermount3.
    #[arg(long)]
    privileged: bool,
}

/// Parse a chunk size string such as `32MiB` into its value in bytes.
fn parse_chunk_size(value: &str) -> Result<u64, String> {
    const UNITS: [(&str, u64); 5] = [
        ("TiB", 1 << 40),
        ("GiB", 1 << 30),
        ("MiB", 1 << 20),
        ("KiB", 1 << 10),
        ("B", 1),
    ];
    for (unit, factor) in UNITS {
        let Some(amount) = value.strip_suffix(unit) else {
            continue;
        };
        let amount: u64 = amount
            .parse()
            .map_err(|_| format!("{amount:?} is not an integer"))?;
        return amount
            .checked_mul(factor)
            .ok_or_else(|| format!("{value:?} does not fit in 64 bits"));
    }
    Err("no unit specified".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let options = SplitOptions {
        exclude_regexp: args.exclude_regexp,
        filename_hash: args.filename_hash,
        filename_includes_total_chunks: args.filename_includes_total_chunks,
        filename_includes_mtime: args.filename_includes_mtime,
    };
    let fs = SplitFs::new(&args.source_directory, args.chunk_size, options)
        .with_context(|| {
            format!(
                "cannot initialize filesystem (available hashes: {})",
                HASH_NAMES.join(", ")
            )
        })?;
    let fuse = SplitFuse::new(Arc::new(fs));

    let label = mount::volume_label(&fuse);
    info!("mounting {label:?} at {}", args.mountpoint.display());
    let mut mount_handle = if args.privileged {
        mount::mount_privileged(fuse, &args.mountpoint).await
    } else {
        mount::mount_unprivileged(fuse, &args.mountpoint).await
    }
    .with_context(|| format!("cannot mount a filesystem at {}", args.mountpoint.display()))?;

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => res.context("filesystem session failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("unmounting {}", args.mountpoint.display());
            mount_handle.unmount().await.context("cannot unmount")?;
        }
    }
    Ok(())
}
