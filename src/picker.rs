//! Interactive root selection.
//!
//! Lists the immediate children of the working directory as a numbered menu
//! and resolves an index/range expression such as `1,3,5-7` into roots.

use crate::filewalker::FileFilter;
use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Leading integer of a selection item, read the lenient way (`" 3x"` is 3).
static LEADING_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CandidateKind {
    Directory,
    File,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Directory => f.write_str("dir"),
            CandidateKind::File => f.write_str("file"),
        }
    }
}

/// One menu line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub name: String,
    pub path: PathBuf,
}

/// Lists the non-excluded directories and matching files directly inside `base_dir`.
///
/// Directories come first, then files, each group ordered by name.
pub async fn list_candidates(base_dir: &Path, filter: &FileFilter) -> Result<Vec<Candidate>> {
    let mut entries = fs::read_dir(base_dir)
        .await
        .with_context(|| format!("Failed to read directory {}", base_dir.display()))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read entry in {}", base_dir.display()))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();

        let kind = if file_type.is_dir() {
            if filter.excludes.contains(&name) {
                continue;
            }
            CandidateKind::Directory
        } else if file_type.is_file() {
            let name_path = Path::new(&name);
            if !filter.has_target_ext(name_path) || filter.is_skipped_by_name(name_path) {
                continue;
            }
            CandidateKind::File
        } else {
            continue;
        };

        candidates.push(Candidate {
            kind,
            name,
            path: entry.path(),
        });
    }

    candidates.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    Ok(candidates)
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    LEADING_INT
        .captures(raw?)
        .and_then(|caps| caps[1].parse().ok())
}

/// Parses a selection expression against a menu of `max_index` items.
///
/// Returns `None` for blank input (select everything). Otherwise returns the
/// chosen 1-based indices, deduplicated and ascending; items that do not parse
/// and indices outside `1..=max_index` are dropped.
pub fn parse_selection(input: &str, max_index: usize) -> Option<Vec<usize>> {
    let raw = input.trim();
    if raw.is_empty() {
        return None;
    }

    let max = i64::try_from(max_index).unwrap_or(i64::MAX);
    let mut chosen = BTreeSet::new();

    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.contains('-') {
            let mut bounds = part.split('-');
            let (Some(a), Some(b)) = (parse_int(bounds.next()), parse_int(bounds.next())) else {
                continue;
            };
            let start = a.min(b).max(1);
            let end = a.max(b).min(max);
            chosen.extend((start..=end).map(|i| i as usize));
        } else if let Some(n) = parse_int(Some(part)) {
            if (1..=max).contains(&n) {
                chosen.insert(n as usize);
            }
        }
    }

    Some(chosen.into_iter().collect())
}

/// Renders the numbered menu.
pub fn render_menu(candidates: &[Candidate]) -> String {
    let mut menu = String::from("\nChoose what to include (entries of the current directory):\n");
    for (idx, candidate) in candidates.iter().enumerate() {
        menu.push_str(&format!(
            "  {}. [{}] {}\n",
            idx + 1,
            candidate.kind,
            candidate.name
        ));
    }
    menu
}

/// Shows the menu on `output`, reads one line from `input`, and returns the chosen roots.
///
/// Blank input selects `base_dir` itself as the single root.
pub async fn prompt_roots<R, W>(
    base_dir: &Path,
    candidates: &[Candidate],
    input: &mut R,
    output: &mut W,
) -> Result<Vec<PathBuf>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(render_menu(candidates).as_bytes())
        .await
        .context("Failed to write selection menu")?;
    output
        .write_all(b"\nEnter indices (e.g. 1,3,5-7) or press Enter for everything: ")
        .await
        .context("Failed to write selection prompt")?;
    output.flush().await.context("Failed to flush selection prompt")?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("Failed to read selection")?;

    Ok(match parse_selection(&line, candidates.len()) {
        None => vec![base_dir.to_path_buf()],
        Some(indices) => indices
            .into_iter()
            .map(|i| candidates[i - 1].path.clone())
            .collect(),
    })
}

/// Lists candidates under `base_dir` and asks the user on stdin/stdout.
pub async fn pick_roots(base_dir: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let candidates = list_candidates(base_dir, filter).await?;
    if candidates.is_empty() {
        bail!(
            "No candidate directories or files found in {}",
            base_dir.display()
        );
    }

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    prompt_roots(base_dir, &candidates, &mut stdin, &mut stdout).await
}
