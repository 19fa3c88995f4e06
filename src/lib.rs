//! # srcfence Library
//!
//! This crate can be used to:
//!
//! - Combine source files from one or more roots into a single text file, each
//!   file preceded by a header line and wrapped in a markdown code fence
//! - Print a directory as an ASCII tree or a flat list of paths
//!
//! ## Usage
//!
//! ### To combine files:
//!
//! ```rust,no_run
//! use srcfence::{Config, Preset, run_combine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::new(Preset::TypeScript, std::env::current_dir()?);
//!     config.paths.push("src".into());
//!
//!     let summary = run_combine(&config).await?;
//!     println!("{} file(s)", summary.files);
//!     Ok(())
//! }
//! ```
//!
//! ### To print a tree:
//!
//! ```rust,no_run
//! use srcfence::{TreeConfig, run_tree};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TreeConfig::new(std::env::current_dir()?);
//!     run_tree(&config).await
//! }
//! ```

pub mod cli;
pub mod filewalker;
pub mod picker;
pub mod tree;
pub mod utils;
pub mod writer;

pub use cli::{Config, EntryKinds, LangMode, Preset, TreeConfig};
pub use filewalker::{FileFilter, collect_files, walk};
pub use tree::run_tree;
pub use writer::{FencedWriter, write_combined};

use anyhow::Result;
use log::{info, warn};
use std::path::PathBuf;
use utils::absolutize;

/// Outcome of a combine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineSummary {
    /// Number of records written.
    pub files: usize,
    /// Absolute path of the combined output.
    pub output_path: PathBuf,
}

/// Roots to walk: the positional paths, the interactive pick, or the working directory.
async fn resolve_roots(config: &Config) -> Result<Vec<PathBuf>> {
    if !config.paths.is_empty() {
        return Ok(config
            .paths
            .iter()
            .map(|p| absolutize(&config.project_root, p))
            .collect());
    }

    if config.pick {
        return picker::pick_roots(&config.project_root, &config.filter).await;
    }

    Ok(vec![config.project_root.clone()])
}

/// Walks the configured roots and writes the combined output file.
pub async fn run_combine(config: &Config) -> Result<CombineSummary> {
    if config.filter.extensions.is_empty() {
        warn!("No extensions configured (use --ext); nothing will match");
    }

    let roots = resolve_roots(config).await?;
    let output_path = absolutize(&config.project_root, &config.output_path);

    let mut files = collect_files(&roots, &config.filter)?;
    files.retain(|f| f != &output_path);
    info!(
        "Combining {} file(s) into {} (fence language: {})",
        files.len(),
        output_path.display(),
        config.lang
    );

    let relative_root = config.show_relative.then(|| config.project_root.clone());
    let written = write_combined(&files, &output_path, config.lang.clone(), relative_root).await?;

    Ok(CombineSummary {
        files: written,
        output_path,
    })
}

/// Entry point shared by the combiner binaries.
pub async fn run_combine_cli(preset: Preset) -> Result<()> {
    let config = cli::parse_args(preset)?;
    utils::init_logger(config.verbosity);

    let summary = run_combine(&config).await?;
    println!("Combined {} file(s) into {}", summary.files, config.output_path.display());
    Ok(())
}
