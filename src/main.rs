//! m2pack CLI - Command-line tool for MapleStory2 pack archives.
//!
//! This is the main entry point for the m2pack command-line application.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use m2pack::prelude::*;

/// m2pack - MapleStory2 .m2h/.m2d archive tool
#[derive(Parser)]
#[command(name = "m2pack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Worker threads (defaults to one per CPU)
    #[arg(long, env = "M2PACK_THREADS", global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack folders into archives written next to them
    Pack {
        /// Targets as VERSION:FOLDER, e.g. MS2F:Data/Xml
        #[arg(required = true, value_name = "VERSION:FOLDER")]
        targets: Vec<String>,
    },

    /// Mirror a directory tree, expanding every .m2h archive into a folder
    Expand {
        /// Directory to scan
        source: PathBuf,

        /// Output directory
        dest: PathBuf,

        /// Do not link the original files into the output
        #[arg(long)]
        no_links: bool,
    },

    /// List contents of an archive
    List {
        /// Path to the .m2h header stream
        m2h: PathBuf,

        /// Show index, sizes and compression per file
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print the stream header of an archive
    Info {
        /// Path to the .m2h header stream
        m2h: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Pack { targets } => cmd_pack(&targets, cli.quiet),
        Commands::Expand {
            source,
            dest,
            no_links,
        } => cmd_expand(&source, &dest, !no_links, cli.quiet),
        Commands::List { m2h, detailed } => cmd_list(&m2h, detailed),
        Commands::Info { m2h } => cmd_info(&m2h),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();
}

fn progress_bar(len: u64, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Split a `VERSION:FOLDER` target.
fn parse_target(target: &str) -> Result<(PackVersion, PathBuf)> {
    let (tag, folder) = target
        .split_once(':')
        .with_context(|| format!("Invalid target `{target}`, expected VERSION:FOLDER"))?;
    let version = PackVersion::from_str(tag)
        .with_context(|| format!("Invalid target `{target}`"))?;
    if folder.is_empty() {
        anyhow::bail!("Invalid target `{target}`: folder is empty");
    }
    Ok((version, PathBuf::from(folder)))
}

/// Outcome of packing a set of targets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PackSummary {
    targets: usize,
    failed: usize,
}

/// Pack every target, logging failures and carrying on with the rest.
fn pack_targets(targets: &[String], quiet: bool) -> Result<PackSummary> {
    let mut failed = 0usize;
    let mut jobs = Vec::with_capacity(targets.len());
    for target in targets {
        match parse_target(target) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                error!("{e:#}");
                failed += 1;
            }
        }
    }

    let pb = progress_bar(jobs.len() as u64, quiet)?;
    let pack_failures = AtomicUsize::new(0);

    jobs.par_iter().for_each(|(version, folder)| {
        let result = pack_folder_to_files(folder, *version)
            .with_context(|| format!("Failed to pack {}", folder.display()));
        match result {
            Ok((header, _)) => {
                info!(folder = %folder.display(), %version, "packed");
                pb.println(format!("{version}: {} -> {}", folder.display(), header.display()));
            }
            Err(e) => {
                pb.suspend(|| error!("{e:#}"));
                pack_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    });

    pb.finish_and_clear();
    Ok(PackSummary {
        targets: targets.len(),
        failed: failed + pack_failures.into_inner(),
    })
}

fn cmd_pack(targets: &[String], quiet: bool) -> Result<()> {
    let start = Instant::now();
    let summary = pack_targets(targets, quiet)?;

    if !quiet {
        println!(
            "Packed {} of {} targets in {:?}",
            summary.targets - summary.failed,
            summary.targets,
            start.elapsed()
        );
    }
    if summary.failed > 0 {
        anyhow::bail!("{} of {} targets failed", summary.failed, summary.targets);
    }
    Ok(())
}

fn is_header_stream(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(HEADER_EXTENSION))
        .unwrap_or(false)
}

#[cfg(unix)]
fn symlink_file(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_file(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_file(_original: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported"))
}

/// Link `original` at `link`; an existing link is left as is.
fn mirror_file(original: &Path, link: &Path) -> Result<()> {
    let target = fs::canonicalize(original)
        .with_context(|| format!("Failed to resolve {}", original.display()))?;
    match symlink_file(&target, link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!(link = %link.display(), "link already exists");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to link {}", link.display())),
    }
}

/// Outcome of expanding a directory tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ExpandSummary {
    /// Header streams found under the source
    archives: usize,
    /// Archives that failed to open or to extract completely
    failed: usize,
    /// Files listed by the archives that opened
    files: usize,
    /// Files written
    extracted: usize,
}

/// Mirror `source` into `dest` and expand each `.m2h` found into
/// `dest/<relative parent>/<stem>/`.
///
/// A broken archive is logged and counted; the others still expand.
fn expand_tree(source: &Path, dest: &Path, links: bool, quiet: bool) -> Result<ExpandSummary> {
    if !source.is_dir() {
        anyhow::bail!("Source folder does not exist: {}", source.display());
    }
    fs::create_dir_all(dest).context("Failed to create output directory")?;

    let mut failed = 0usize;
    let mut headers = Vec::new();

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(source)?;
        let mirrored = dest.join(relative);
        if let Some(parent) = mirrored.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        if links {
            if let Err(e) = mirror_file(entry.path(), &mirrored) {
                warn!("{e:#}");
            }
        }

        if is_header_stream(entry.path()) {
            let expansion = mirrored.with_extension("");
            headers.push((entry.into_path(), expansion));
        }
    }

    let found = headers.len();
    debug!(archives = found, "scanned source tree");

    let mut archives = Vec::with_capacity(headers.len());
    for (header, expansion) in headers {
        match PackArchive::open(&header) {
            Ok(archive) => {
                info!(
                    archive = %header.display(),
                    version = %archive.version(),
                    files = archive.entry_count(),
                    "opened archive"
                );
                archives.push((header, archive, expansion));
            }
            Err(e) => {
                error!("Failed to open {}: {e}", header.display());
                failed += 1;
            }
        }
    }

    let total: usize = archives.iter().map(|(_, archive, _)| archive.entry_count()).sum();
    let pb = progress_bar(total as u64, quiet)?;
    let archive_failures = AtomicUsize::new(0);
    let extracted = AtomicUsize::new(0);

    archives.par_iter().for_each(|(header, archive, expansion)| {
        if let Err(e) = fs::create_dir_all(expansion) {
            pb.suspend(|| error!("Failed to create {}: {e}", expansion.display()));
            archive_failures.fetch_add(1, Ordering::Relaxed);
            pb.inc(archive.entry_count() as u64);
            return;
        }

        let stats = archive.extract_parallel(expansion, |_, result| {
            if let Err(e) = result {
                pb.suspend(|| error!("{}: {e}", header.display()));
            }
            pb.inc(1);
        });

        extracted.fetch_add(stats.extracted, Ordering::Relaxed);
        if stats.errors > 0 {
            archive_failures.fetch_add(1, Ordering::Relaxed);
        }
    });

    pb.finish_and_clear();
    Ok(ExpandSummary {
        archives: found,
        failed: failed + archive_failures.into_inner(),
        files: total,
        extracted: extracted.into_inner(),
    })
}

fn cmd_expand(source: &Path, dest: &Path, links: bool, quiet: bool) -> Result<()> {
    let start = Instant::now();
    let summary = expand_tree(source, dest, links, quiet)?;

    if !quiet {
        println!("Found {} archives", summary.archives);
        println!(
            "Extracted {} of {} files in {:?}",
            summary.extracted,
            summary.files,
            start.elapsed()
        );
    }
    if summary.failed > 0 {
        anyhow::bail!("{} archives failed to expand", summary.failed);
    }
    Ok(())
}

fn cmd_list(m2h: &Path, detailed: bool) -> Result<()> {
    let archive = PackArchive::open(m2h).context("Failed to open archive")?;

    for entry in archive.iter() {
        if detailed {
            let record = &entry.record;
            println!(
                "{:>6} {:>12} {:>12} {:>12} {} {}",
                record.file_index,
                record.size,
                record.compressed_size,
                record.encoded_size,
                if record.is_compressed() { "Z" } else { " " },
                entry.name
            );
        } else {
            println!("{}", entry.name);
        }
    }

    println!("\nTotal: {} entries ({})", archive.entry_count(), archive.version());

    Ok(())
}

fn cmd_info(m2h: &Path) -> Result<()> {
    let bytes = fs::read(m2h).context("Failed to read header stream")?;

    let mut reader = BinaryReader::new(&bytes);
    let magic = reader.read_array::<4>().context("Failed to read magic")?;
    let version = PackVersion::from_magic(magic)?;
    let header = version.read_header(&mut reader)?;

    println!("File: {}", m2h.display());
    println!("Magic: {version}");
    let fields = [
        ("TotalFiles", header.total_files),
        ("FileListSize", header.file_list_size),
        ("FileListCompressedSize", header.file_list_compressed_size),
        ("FileListEncodedSize", header.file_list_encoded_size),
        ("FATSize", header.fat_size),
        ("FATCompressedSize", header.fat_compressed_size),
        ("FATEncodedSize", header.fat_encoded_size),
    ];
    for (name, value) in fields {
        println!("{name}: {value:#x} ( {value} )");
    }

    Ok(())
}
