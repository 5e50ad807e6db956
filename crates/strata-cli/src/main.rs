//! strata command-line tool.
//!
//! Builds a virtual filesystem from directories and archives, then runs one
//! command against it.
//!
//! Usage:
//!   strata -m assets -m patch.tar.gz ls /
//!   strata -m base.tar=/pak cat /pak/readme.txt
//!   strata --config strata.ron stat /maps --json
//!   strata -m assets --write-dir save put notes.txt /notes.txt
//!
//! Logging goes to stderr and honors `RUST_LOG` (default `info`).

mod config;

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strata_vfs::{FileInfo, ReadOnlyView, Vfs, VfsConfig};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{MountSpec, StrataConfig};

/// Layered virtual filesystem over directories and archives.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Browse and modify a layered virtual filesystem")]
struct Args {
    /// RON configuration file applied before command-line mounts
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source to mount, as SOURCE or SOURCE=MOUNT_POINT (repeatable)
    #[arg(short, long = "mount", value_name = "SOURCE[=MOUNT_POINT]")]
    mounts: Vec<String>,

    /// Put command-line mounts in front of the search path
    #[arg(long)]
    prepend: bool,

    /// Host directory that receives writes
    #[arg(short, long)]
    write_dir: Option<PathBuf>,

    /// Follow symbolic links in mounted directories
    #[arg(long)]
    follow_symlinks: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Show type, size and modification time
        #[arg(short, long)]
        long: bool,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Show file information
    Stat {
        path: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which mounted source provides a path
    Which { path: String },
    /// List mounted sources in search order
    SearchPath,
    /// List supported archive formats
    Formats,
    /// Copy a host file (or `-` for stdin) into the write directory
    Put { source: String, dest: String },
    /// Create a directory in the write directory
    Mkdir { path: String },
    /// Delete a file or empty directory from the write directory
    Rm {
        path: String,
        /// Delete directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let vfs = build_vfs(&args)?;
    let stdout = io::stdout();
    run(&vfs, &args.command, &mut stdout.lock())
}

/// Configuration file first, then command-line flags on top of it.
fn build_vfs(args: &Args) -> Result<Vfs> {
    let config = match &args.config {
        Some(path) => StrataConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StrataConfig::default(),
    };

    let vfs_config = VfsConfig {
        permit_symlinks: config.vfs.permit_symlinks || args.follow_symlinks,
        ..config.vfs.clone()
    };
    let vfs = Vfs::with_config(vfs_config);
    strata_tar::register_defaults(&vfs);
    config.apply(&vfs)?;

    for spec in &args.mounts {
        let mount = MountSpec::parse(spec, !args.prepend);
        mount
            .apply(&vfs)
            .with_context(|| format!("mounting {}", mount.source.display()))?;
    }
    if let Some(dir) = &args.write_dir {
        vfs.set_write_dir(dir)
            .with_context(|| format!("setting write directory {}", dir.display()))?;
    }

    debug!(sources = vfs.search_path().len(), "Filesystem ready");
    Ok(vfs)
}

fn run(vfs: &Vfs, command: &Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Ls { path, long } => {
            let mut dir = ReadOnlyView::new(vfs.clone()).open(path)?;
            for info in dir.readdir(0)? {
                if *long {
                    writeln!(out, "{}", long_line(&info))?;
                } else if info.is_dir {
                    writeln!(out, "{}/", info.name)?;
                } else {
                    writeln!(out, "{}", info.name)?;
                }
            }
        }
        Command::Cat { path } => {
            out.write_all(&vfs.read(path)?)?;
        }
        Command::Stat { path, json } => {
            let info = ReadOnlyView::new(vfs.clone()).stat(path)?;
            if *json {
                serde_json::to_writer_pretty(&mut *out, &info)?;
                writeln!(out)?;
            } else {
                writeln!(out, "{}", long_line(&info))?;
            }
        }
        Command::Which { path } => match vfs.real_dir(path)? {
            Some(source) => writeln!(out, "{source}")?,
            None => writeln!(out, "(virtual)")?,
        },
        Command::SearchPath => {
            for mount in vfs.mounts() {
                writeln!(out, "{}\t{}\t{}", mount.id, mount.mount_point, mount.format)?;
            }
        }
        Command::Formats => {
            for info in vfs.supported_archive_types() {
                writeln!(out, "{}\t.{}\t{}", info.name, info.extension, info.description)?;
            }
        }
        Command::Put { source, dest } => {
            let mut file = vfs.create(dest)?;
            let copied = if source == "-" {
                io::copy(&mut io::stdin().lock(), &mut file)?
            } else {
                let mut host = File::open(source).with_context(|| format!("opening {source}"))?;
                io::copy(&mut host, &mut file)?
            };
            file.close()?;
            debug!(dest = %dest, bytes = copied, "Copied");
        }
        Command::Mkdir { path } => vfs.mkdir(path)?,
        Command::Rm { path, recursive } => {
            if *recursive {
                vfs.delete_recursive(path)?;
            } else {
                vfs.delete(path)?;
            }
        }
    }
    Ok(())
}

fn long_line(info: &FileInfo) -> String {
    let kind = if info.is_dir { 'd' } else { '-' };
    let modified = info
        .mod_time
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{kind} {:>10} {:>12} {}", info.size, modified, info.name)
}
