//! # outtrack CLI
//!
//! Thin command-line shell over the outtrack library. Each tracked artifact
//! gets a `<path>.out` file next to it holding the output's persisted mapping.
//!
//! ## Usage
//! ```bash
//! # Initialize a project in the current directory
//! outtrack init
//!
//! # Print the relative path to the project root
//! outtrack root
//!
//! # Track an artifact (stores it in the cache, writes data/train.csv.out)
//! outtrack add data/train.csv
//!
//! # Show changed outputs
//! outtrack status
//!
//! # Restore cached content, overwriting local edits
//! outtrack checkout --force data/train.csv.out
//!
//! # Move or remove a tracked artifact
//! outtrack move data/train.csv data2/train.csv
//! outtrack remove --ignore-remove data2/train.csv
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use outtrack::{
    find_root, utils, CompressionStrategy, Metric, Output, OutputError, OutputStatus, ProjectConfig,
    ProjectContext, Role,
};
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const OUT_SUFFIX: &str = ".out";

/// outtrack - track data artifacts in a content-addressable cache
#[derive(Parser)]
#[command(name = "outtrack")]
#[command(version)]
#[command(about = "Track data artifacts in a content-addressable cache")]
#[command(long_about = None)]
struct Cli {
    /// Directory to run in (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project
    Init {
        /// Compression for cache objects
        #[arg(long, value_enum, default_value = "fast")]
        compression: CompressionMode,
    },

    /// Relative path to project's directory
    Root,

    /// Start tracking an artifact
    Add {
        /// Artifact path or url
        target: String,

        /// Record the fingerprint only, without caching content
        #[arg(long)]
        no_cache: bool,

        /// Mark the artifact as a metric
        #[arg(long)]
        metric: bool,
    },

    /// Show changed outputs
    Status {
        /// `.out` files (defaults to every one in the project)
        targets: Vec<PathBuf>,
    },

    /// Restore outputs from the cache
    Checkout {
        /// `.out` files (defaults to every one in the project)
        targets: Vec<PathBuf>,

        /// Overwrite local modifications
        #[arg(short, long)]
        force: bool,
    },

    /// Move a tracked artifact
    #[command(alias = "mv")]
    Move {
        /// Tracked artifact
        src: String,
        /// New location
        dst: String,
    },

    /// Delete a tracked artifact and its `.out` file
    #[command(alias = "rm")]
    Remove {
        /// Tracked artifact
        target: String,

        /// Also drop the artifact's ignore entry
        #[arg(long)]
        ignore_remove: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CompressionMode {
    None,
    Fast,
}

impl From<CompressionMode> for CompressionStrategy {
    fn from(mode: CompressionMode) -> Self {
        match mode {
            CompressionMode::None => CompressionStrategy::None,
            CompressionMode::Fast => CompressionStrategy::Fast,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("outtrack=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        match e.downcast_ref::<OutputError>() {
            Some(err) => eprintln!("{}: {}", "Error".red().bold(), err.user_message()),
            None => eprintln!("{}: {:#}", "Error".red().bold(), e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = match cli.path {
        Some(path) => path,
        None => env::current_dir().context("cannot determine current directory")?,
    };

    if let Commands::Init { compression } = cli.command {
        return cmd_init(&cwd, compression);
    }

    let root = find_root(&cwd)?;
    let ctx = Arc::new(ProjectContext::open(&root)?);
    let cwd = fs::canonicalize(&cwd)?;

    let result = match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Root => cmd_root(&cwd, ctx.root()),
        Commands::Add { target, no_cache, metric } => cmd_add(&ctx, &cwd, &target, !no_cache, metric),
        Commands::Status { targets } => cmd_status(&ctx, &cwd, targets),
        Commands::Checkout { targets, force } => cmd_checkout(&ctx, &cwd, targets, force),
        Commands::Move { src, dst } => cmd_move(&ctx, &cwd, &src, &dst),
        Commands::Remove { target, ignore_remove } => cmd_remove(&ctx, &cwd, &target, ignore_remove),
    };

    ctx.persist_state()?;
    result
}

fn cmd_init(dir: &Path, compression: CompressionMode) -> anyhow::Result<()> {
    if ProjectConfig::path(dir).exists() {
        bail!("{} is already initialized", dir.display());
    }
    let config = ProjectConfig {
        compression: compression.into(),
        ..ProjectConfig::default()
    };
    config.save(dir)?;
    let ctx = ProjectContext::open(dir)?;

    println!("{} Initialized project", "✓".green().bold());
    println!("  Root: {}", ctx.root().display().to_string().cyan());
    println!("\nNext steps:");
    println!("  - Track an artifact: {}", "outtrack add data/train.csv".yellow());
    Ok(())
}

fn cmd_root(cwd: &Path, root: &Path) -> anyhow::Result<()> {
    println!("{}", relative_to(root, cwd).display());
    Ok(())
}

fn cmd_add(ctx: &Arc<ProjectContext>, cwd: &Path, target: &str, cache: bool, metric: bool) -> anyhow::Result<()> {
    let url = project_url(ctx, cwd, target);
    let mut out = Output::builder(ctx.clone(), url)
        .cache(cache)
        .metric(Metric::from(metric))
        .build()?;

    out.verify()?;
    out.save()?;
    if out.use_cache() && out.is_local() {
        if let Some(path) = out.path_info().fs_path() {
            ctx.scm().ignore(&path)?;
        }
    }
    let out_file = write_out_file(ctx, &out)?;

    println!("{} Tracking {}", "✓".green().bold(), out.to_string().cyan());
    if let Some(info) = out.info() {
        println!(
            "  Fingerprint: {} ({})",
            info.to_string().yellow(),
            utils::format_bytes(info.size().unwrap_or(0))
        );
    }
    println!("  Saved to: {}", relative_to(&out_file, cwd).display().to_string().dimmed());
    Ok(())
}

fn cmd_status(ctx: &Arc<ProjectContext>, cwd: &Path, targets: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut changed = 0;
    for out_file in out_files(ctx, cwd, targets)? {
        let out = load_out_file(ctx, &out_file)?;
        let status = out.status_detail()?;
        if status == OutputStatus::Unchanged {
            continue;
        }
        changed += 1;
        let label = match status {
            OutputStatus::Missing => status.to_string().red(),
            OutputStatus::New => status.to_string().green(),
            _ => status.to_string().yellow(),
        };
        println!("  {}: {}", label, out);
    }

    if changed == 0 {
        println!("{}", "Everything is up to date.".green());
    }
    Ok(())
}

fn cmd_checkout(ctx: &Arc<ProjectContext>, cwd: &Path, targets: Vec<PathBuf>, force: bool) -> anyhow::Result<()> {
    let mut restored = 0;
    for out_file in out_files(ctx, cwd, targets)? {
        let out = load_out_file(ctx, &out_file)?;
        if !out.changed()? {
            continue;
        }
        out.checkout(force)
            .with_context(|| format!("failed to check out '{}'", out))?;
        restored += 1;
        println!("{} {}", "✓".green().bold(), out);
    }
    println!("Checked out {} output(s)", restored.to_string().cyan());
    Ok(())
}

fn cmd_move(ctx: &Arc<ProjectContext>, cwd: &Path, src: &str, dst: &str) -> anyhow::Result<()> {
    let src_file = out_file_for(ctx, &project_url(ctx, cwd, src));
    let mut out = load_out_file(ctx, &src_file)?;

    let target = Output::builder(ctx.clone(), project_url(ctx, cwd, dst))
        .cache(out.use_cache())
        .metric(out.metric().clone())
        .build()?;
    out.move_to(&target)?;

    write_out_file(ctx, &out)?;
    fs::remove_file(&src_file).with_context(|| format!("cannot remove {}", src_file.display()))?;
    println!("{} Moved {} → {}", "✓".green().bold(), src.cyan(), out.to_string().cyan());
    Ok(())
}

fn cmd_remove(ctx: &Arc<ProjectContext>, cwd: &Path, target: &str, ignore_remove: bool) -> anyhow::Result<()> {
    let out_file = out_file_for(ctx, &project_url(ctx, cwd, target));
    let out = load_out_file(ctx, &out_file)?;

    out.remove(ignore_remove)?;
    fs::remove_file(&out_file).with_context(|| format!("cannot remove {}", out_file.display()))?;
    println!("{} Removed {}", "✓".green().bold(), out.to_string().cyan());
    Ok(())
}

/// Declared location for a user-supplied target: local paths become
/// relative to the project root, urls are kept as given
fn project_url(ctx: &ProjectContext, cwd: &Path, target: &str) -> String {
    if !Output::supported(target) || target.contains("://") {
        return target.to_string();
    }
    let absolute = cwd.join(target);
    match absolute.strip_prefix(ctx.root()) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => absolute.display().to_string(),
    }
}

fn out_file_for(ctx: &ProjectContext, url: &str) -> PathBuf {
    let name = format!("{}{}", url.replace("://", "/"), OUT_SUFFIX);
    if url.contains("://") {
        ctx.project_dir().join("outs").join(name)
    } else {
        ctx.root().join(name)
    }
}

fn write_out_file(ctx: &ProjectContext, out: &Output) -> anyhow::Result<PathBuf> {
    let path = out_file_for(ctx, out.url());
    let json = serde_json::to_string_pretty(&Value::Object(out.dumpd()))?;
    utils::atomic_write(&path, json.as_bytes())?;
    Ok(path)
}

fn load_out_file(ctx: &Arc<ProjectContext>, path: &Path) -> anyhow::Result<Output> {
    let text = fs::read_to_string(path).with_context(|| format!("{} is not tracked", path.display()))?;
    let map: Map<String, Value> =
        serde_json::from_str(&text).with_context(|| format!("invalid out file {}", path.display()))?;
    Ok(Output::loadd(ctx.clone(), &map, Role::Output)?)
}

fn out_files(ctx: &ProjectContext, cwd: &Path, targets: Vec<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
    if !targets.is_empty() {
        return Ok(targets.into_iter().map(|t| cwd.join(t)).collect());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(ctx.root())
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git" && e.file_name() != ".outtrack")
    {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(OUT_SUFFIX) {
            files.push(entry.into_path());
        }
    }
    let outs_dir = ctx.project_dir().join("outs");
    if outs_dir.is_dir() {
        for entry in WalkDir::new(outs_dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// `path` relative to `base`, where `path` is an ancestor of `base` or below it
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    if let Ok(below) = path.strip_prefix(base) {
        return if below.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            below.to_path_buf()
        };
    }
    match base.strip_prefix(path) {
        Ok(above) => above
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .map(|_| Component::ParentDir.as_os_str())
            .collect(),
        Err(_) => path.to_path_buf(),
    }
}
