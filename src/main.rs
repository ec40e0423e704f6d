use anyhow::{anyhow, Context, Result};
use clap::Parser;
use filevault::import::{ImportContext, ImportJob, ImportOptions, ImportStatusCode, Resolution};
use filevault::{FsFileVault, SqliteFileCatalog, StandardFileAnalyzer};
use std::path::PathBuf;
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_resolution(s: &str) -> Result<Resolution> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("Expected WIDTHxHEIGHT, got: {}", s))?;
    Ok((
        width.trim().parse().context("Invalid width")?,
        height.trim().parse().context("Invalid height")?,
    ))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(value_parser = parse_path)]
    pub catalog_db: PathBuf,

    /// Root directory of the file vault.
    #[clap(value_parser = parse_path)]
    pub vault_dir: PathBuf,

    /// Files or directories to import. Directories are walked recursively.
    #[clap(required = true, value_parser = parse_path)]
    pub paths: Vec<PathBuf>,

    /// Reject files smaller than this many bytes.
    #[clap(long)]
    pub min_size: Option<u64>,

    /// Reject files larger than this many bytes.
    #[clap(long)]
    pub max_size: Option<u64>,

    /// Reject gifs larger than this many bytes.
    #[clap(long)]
    pub max_gif_size: Option<u64>,

    /// Reject images smaller than this resolution, e.g. 100x100.
    #[clap(long, value_parser = parse_resolution)]
    pub min_resolution: Option<Resolution>,

    /// Reject images larger than this resolution, e.g. 8000x8000.
    #[clap(long, value_parser = parse_resolution)]
    pub max_resolution: Option<Resolution>,

    /// Import files again even if they were previously deleted.
    #[clap(long)]
    pub include_deleted: bool,

    /// Reject images whose decoded size is suspiciously large.
    #[clap(long)]
    pub no_decompression_bombs: bool,

    /// Archive files that turn out to be in the vault already.
    #[clap(long)]
    pub auto_archive: bool,
}

impl CliArgs {
    fn import_options(&self) -> ImportOptions {
        let mut options = ImportOptions::default();
        options.set_exclude_deleted(!self.include_deleted);
        options.set_allow_decompression_bombs(!self.no_decompression_bombs);
        options.set_min_size(self.min_size);
        options.set_max_size(self.max_size);
        options.set_max_gif_size(self.max_gif_size);
        options.set_min_resolution(self.min_resolution);
        options.set_max_resolution(self.max_resolution);
        options.set_automatic_archive(self.auto_archive);
        options
    }
}

/// Expand the argument list into individual files, walking directories.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        files.push(entry.path().to_path_buf())
                    }
                    Ok(_) => {}
                    Err(e) => error!("Failed to walk {:?}: {}", path, e),
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files
}

#[derive(Debug, Default)]
struct Tally {
    imported: usize,
    already_present: usize,
    previously_deleted: usize,
    vetoed: usize,
    failed: usize,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let options = cli_args.import_options();
    info!("Import policy: {}", options.summary());

    info!(
        "Opening SQLite catalog database at {:?}...",
        cli_args.catalog_db
    );
    let catalog = SqliteFileCatalog::open(&cli_args.catalog_db)?;
    let vault = FsFileVault::open(&cli_args.vault_dir)?;
    let analyzer = StandardFileAnalyzer::new();

    let ctx = ImportContext::new(&analyzer, &vault, &catalog, &catalog);

    let files = collect_files(&cli_args.paths);
    info!("Importing {} files", files.len());

    let mut tally = Tally::default();
    for path in &files {
        let mut job = ImportJob::new(path, options.clone());
        let result = job.run_with_progress(&ctx, &mut |stage| debug!("{:?}: {}", path, stage));

        match result {
            Ok(status) => {
                info!("{:?}: {}", path, status);
                match status.code {
                    ImportStatusCode::New => tally.imported += 1,
                    ImportStatusCode::AlreadyPresent => tally.already_present += 1,
                    ImportStatusCode::PreviouslyDeleted => tally.previously_deleted += 1,
                    ImportStatusCode::Vetoed => tally.vetoed += 1,
                    ImportStatusCode::Unknown => tally.failed += 1,
                }
            }
            Err(e) => {
                error!("{:?}: import failed: {}", path, e);
                tally.failed += 1;
            }
        }
    }

    info!(
        "Done: {} imported, {} already present, {} previously deleted, {} vetoed, {} failed",
        tally.imported, tally.already_present, tally.previously_deleted, tally.vetoed, tally.failed
    );

    Ok(())
}
