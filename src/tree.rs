//! Directory tree and flat listing output for `srctree`.
//!
//! Both modes walk with an explicit stack, never follow symbolic links, prune
//! excluded name components at any depth, and silently skip directories that
//! cannot be read.

use crate::cli::{EntryKinds, TreeConfig};
use crate::filewalker::is_excluded_path;
use crate::utils::{absolutize, relative_to};
use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

#[derive(Debug, Clone)]
struct TreeEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

/// A directory whose entries are being printed.
struct Frame {
    prefix: String,
    depth: usize,
    entries: Vec<TreeEntry>,
    idx: usize,
}

/// Streams the tree or list for `config` into `out`.
pub struct TreePrinter<'a, W: AsyncWrite + Unpin> {
    config: &'a TreeConfig,
    out: &'a mut W,
}

impl<'a, W: AsyncWrite + Unpin> TreePrinter<'a, W> {
    pub fn new(config: &'a TreeConfig, out: &'a mut W) -> Self {
        Self { config, out }
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.out
            .write_all(format!("{line}\n").as_bytes())
            .await
            .context("Failed to write tree output")
    }

    fn may_descend(&self, depth: usize) -> bool {
        self.config.max_depth.is_none_or(|max| depth + 1 <= max)
    }

    fn display(&self, path: &Path) -> String {
        if !self.config.relative {
            return path.display().to_string();
        }
        let rel = relative_to(path, &self.config.project_root);
        if rel.as_os_str().is_empty() {
            ".".to_string()
        } else {
            rel.display().to_string()
        }
    }

    fn root_label(&self, root: &Path) -> String {
        if self.config.relative {
            return self.display(root);
        }
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string())
    }

    /// Reads `dir`, dropping symlinks, excluded paths and special files.
    ///
    /// Directories sort before files, then by name. An unreadable directory yields nothing.
    async fn read_entries(&self, dir: &Path) -> Vec<TreeEntry> {
        let mut read_dir = match fs::read_dir(dir).await {
            Ok(read_dir) => read_dir,
            Err(err) => {
                debug!("Skipping unreadable directory {}: {err}", dir.display());
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    debug!("Stopped reading {}: {err}", dir.display());
                    break;
                }
            };
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let path = entry.path();
            if file_type.is_symlink() || is_excluded_path(&path, &self.config.excludes) {
                continue;
            }
            if !file_type.is_dir() && !file_type.is_file() {
                continue;
            }
            entries.push(TreeEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                is_dir: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        entries
    }

    /// Prints the listing for `root`. A missing root prints nothing.
    pub async fn print(&mut self, root: &Path) -> Result<()> {
        let Ok(metadata) = fs::metadata(root).await else {
            debug!("Nothing to print: {} does not exist", root.display());
            return Ok(());
        };

        if metadata.is_file() {
            if self.config.kinds != EntryKinds::DirsOnly {
                let line = if self.config.list_mode {
                    self.display(root)
                } else {
                    self.root_label(root)
                };
                self.write_line(&line).await?;
            }
            return Ok(());
        }

        if !metadata.is_dir() {
            return Ok(());
        }

        if self.config.list_mode {
            self.print_list(root).await
        } else {
            self.print_tree(root).await
        }
    }

    async fn print_list(&mut self, root: &Path) -> Result<()> {
        let mut stack = vec![(root.to_path_buf(), 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            let entries = self.read_entries(&dir).await;
            let mut subdirs = Vec::new();

            for entry in entries {
                let shown = match self.config.kinds {
                    EntryKinds::All => true,
                    EntryKinds::FilesOnly => !entry.is_dir,
                    EntryKinds::DirsOnly => entry.is_dir,
                };
                if shown {
                    let line = self.display(&entry.path);
                    self.write_line(&line).await?;
                }
                if entry.is_dir && self.may_descend(depth) {
                    subdirs.push((entry.path, depth + 1));
                }
            }

            stack.extend(subdirs.into_iter().rev());
        }

        Ok(())
    }

    async fn print_tree(&mut self, root: &Path) -> Result<()> {
        let label = self.root_label(root);
        self.write_line(&label).await?;

        let mut frames = vec![Frame {
            prefix: String::new(),
            depth: 0,
            entries: self.tree_entries(root).await,
            idx: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            if frame.idx >= frame.entries.len() {
                frames.pop();
                continue;
            }

            let entry = frame.entries[frame.idx].clone();
            frame.idx += 1;

            let is_last = frame.idx == frame.entries.len();
            let connector = if is_last { "└── " } else { "├── " };
            let child_prefix = format!("{}{}", frame.prefix, if is_last { "    " } else { "│   " });
            let line = if entry.is_dir {
                format!("{}{}{}/", frame.prefix, connector, entry.name)
            } else {
                format!("{}{}{}", frame.prefix, connector, entry.name)
            };
            let depth = frame.depth;

            self.write_line(&line).await?;

            if entry.is_dir && self.may_descend(depth) {
                let entries = self.tree_entries(&entry.path).await;
                frames.push(Frame {
                    prefix: child_prefix,
                    depth: depth + 1,
                    entries,
                    idx: 0,
                });
            }
        }

        Ok(())
    }

    /// Entries drawn in tree mode. Directories are kept under `--files-only`.
    async fn tree_entries(&self, dir: &Path) -> Vec<TreeEntry> {
        let mut entries = self.read_entries(dir).await;
        if self.config.kinds == EntryKinds::DirsOnly {
            entries.retain(|e| e.is_dir);
        }
        entries
    }
}

/// Prints the tree or list described by `config` to its output file or stdout.
pub async fn run_tree(config: &TreeConfig) -> Result<()> {
    let root = absolutize(&config.project_root, &config.target);

    match &config.output_path {
        Some(out_path) => {
            let out_path = absolutize(&config.project_root, out_path);
            let file = fs::File::create(&out_path)
                .await
                .with_context(|| format!("Failed to create output file {}", out_path.display()))?;
            let mut out = BufWriter::new(file);
            TreePrinter::new(config, &mut out).print(&root).await?;
            out.shutdown().await.context("Failed to close output")?;
        }
        None => {
            let mut out = BufWriter::new(tokio::io::stdout());
            TreePrinter::new(config, &mut out).print(&root).await?;
            out.flush().await.context("Failed to flush stdout")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::tempdir;

    fn config(root: &Path) -> TreeConfig {
        TreeConfig::new(root.to_path_buf())
    }

    async fn render(config: &TreeConfig, root: &Path) -> String {
        let mut out = Vec::new();
        TreePrinter::new(config, &mut out).print(root).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    fn sample(root: &Path) {
        stdfs::create_dir_all(root.join("proj/src/nested")).unwrap();
        stdfs::create_dir_all(root.join("proj/node_modules/pkg")).unwrap();
        stdfs::create_dir_all(root.join("proj/.git")).unwrap();
        stdfs::write(root.join("proj/src/nested/deep.rs"), "").unwrap();
        stdfs::write(root.join("proj/src/main.rs"), "").unwrap();
        stdfs::write(root.join("proj/README.md"), "").unwrap();
        stdfs::write(root.join("proj/Cargo.toml"), "").unwrap();
    }

    #[tokio::test]
    async fn test_tree_layout() {
        let dir = tempdir().unwrap();
        sample(dir.path());
        let root = dir.path().join("proj");

        let out = render(&config(dir.path()), &root).await;
        let expected = "\
proj
├── src/
│   ├── nested/
│   │   └── deep.rs
│   └── main.rs
├── Cargo.toml
└── README.md
";
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_tree_max_depth_zero_lists_root_entries_only() {
        let dir = tempdir().unwrap();
        sample(dir.path());
        let mut cfg = config(dir.path());
        cfg.max_depth = Some(0);

        let out = render(&cfg, &dir.path().join("proj")).await;
        assert_eq!(out, "proj\n├── src/\n├── Cargo.toml\n└── README.md\n");
    }

    #[tokio::test]
    async fn test_tree_dirs_only() {
        let dir = tempdir().unwrap();
        sample(dir.path());
        let mut cfg = config(dir.path());
        cfg.kinds = EntryKinds::DirsOnly;

        let out = render(&cfg, &dir.path().join("proj")).await;
        assert_eq!(out, "proj\n└── src/\n    └── nested/\n");
    }

    #[tokio::test]
    async fn test_list_relative_files_only() {
        let dir = tempdir().unwrap();
        sample(dir.path());
        let mut cfg = config(dir.path());
        cfg.list_mode = true;
        cfg.relative = true;
        cfg.kinds = EntryKinds::FilesOnly;

        let out = render(&cfg, &dir.path().join("proj")).await;
        let lines: Vec<_> = out.lines().collect();
        let expected: Vec<String> = [
            "proj/Cargo.toml",
            "proj/README.md",
            "proj/src/main.rs",
            "proj/src/nested/deep.rs",
        ]
        .iter()
        .map(|p| Path::new(p).display().to_string())
        .collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn test_list_root_file_prints_itself() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        stdfs::write(&file, "").unwrap();
        let mut cfg = config(dir.path());
        cfg.list_mode = true;
        cfg.relative = true;

        assert_eq!(render(&cfg, &file).await, "a.txt\n");
    }

    #[tokio::test]
    async fn test_missing_root_prints_nothing() {
        let dir = tempdir().unwrap();
        let out = render(&config(dir.path()), &dir.path().join("missing")).await;
        assert!(out.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_not_followed() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("r");
        stdfs::create_dir(&root).unwrap();
        stdfs::write(root.join("a.txt"), "").unwrap();
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        let out = render(&config(dir.path()), &root).await;
        assert_eq!(out, "r\n└── a.txt\n");
    }
}
