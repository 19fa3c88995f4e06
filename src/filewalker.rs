use anyhow::{Context, Result};
use ignore::WalkBuilder;
use log::{debug, info};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Inclusion rules shared by the walker and the picker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    /// Name components that prune any matching file or directory.
    pub excludes: BTreeSet<String>,
    /// Allowed extensions, lower-case with a leading dot. Empty matches nothing.
    pub extensions: BTreeSet<String>,
    /// Files whose name contains any of these (case-insensitive) are skipped.
    pub skip_name_fragments: Vec<String>,
}

impl FileFilter {
    pub fn new(
        excludes: BTreeSet<String>,
        extensions: BTreeSet<String>,
        skip_name_fragments: Vec<String>,
    ) -> Self {
        Self {
            excludes,
            extensions,
            skip_name_fragments,
        }
    }

    pub fn has_target_ext(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        self.extensions.contains(&ext)
    }

    pub fn is_skipped_by_name(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        self.skip_name_fragments
            .iter()
            .filter(|frag| !frag.is_empty())
            .any(|frag| name.contains(&frag.to_lowercase()))
    }

    /// True if any component of `path` is an excluded name.
    pub fn is_excluded_path(&self, path: &Path) -> bool {
        is_excluded_path(path, &self.excludes)
    }

    /// The rule applied to every candidate file, whether a root or found while walking.
    pub fn accepts_file(&self, path: &Path) -> bool {
        self.has_target_ext(path) && !self.is_skipped_by_name(path) && !self.is_excluded_path(path)
    }
}

/// Lower-cases an extension and gives it a leading dot. Blank input yields "".
pub fn normalize_ext(raw: &str) -> String {
    let ext = raw.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// True if any normal component of `path` is in `excludes`.
pub fn is_excluded_path(path: &Path, excludes: &BTreeSet<String>) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => excludes.contains(name.to_string_lossy().as_ref()),
        _ => false,
    })
}

/// Collects the files under `root` that pass `filter`.
///
/// A missing root yields nothing. Symbolic links below the root are neither
/// followed nor returned. Siblings come back in no particular order.
pub fn walk(root: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let metadata = match std::fs::metadata(root) {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!("Skipping {}: {err}", root.display());
            return Ok(Vec::new());
        }
    };

    if metadata.is_file() {
        return Ok(if filter.accepts_file(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    if !metadata.is_dir() || filter.is_excluded_path(root) {
        return Ok(Vec::new());
    }

    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(false);

    let excludes = filter.excludes.clone();
    builder.filter_entry(move |entry| {
        entry.depth() == 0
            || !excludes.contains(entry.file_name().to_string_lossy().as_ref())
    });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry =
            result.with_context(|| format!("Failed to walk directory {}", root.display()))?;

        let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
        if is_file && filter.accepts_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Walks every root and returns the deduplicated files in lexicographic path order.
pub fn collect_files(roots: &[PathBuf], filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        let found = walk(root, filter)?;
        info!("{}: {} matching file(s)", root.display(), found.len());
        files.extend(found);
    }
    Ok(sort_unique(files))
}

/// Sorts by the path's string form and drops duplicates.
pub fn sort_unique(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let unique: BTreeSet<_> = files
        .into_iter()
        .map(|p| crate::utils::normalize_path(&p).into_os_string())
        .collect();
    unique.into_iter().map(PathBuf::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn filter(exts: &[&str]) -> FileFilter {
        FileFilter::new(
            crate::cli::default_excludes(),
            exts.iter().map(|e| normalize_ext(e)).collect(),
            crate::cli::default_skip_name_fragments(),
        )
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_normalize_ext() {
        assert_eq!(normalize_ext("TS"), ".ts");
        assert_eq!(normalize_ext(" .Py "), ".py");
        assert_eq!(normalize_ext("  "), "");
    }

    #[test]
    fn test_excluded_component_anywhere() {
        let excludes = crate::cli::default_excludes();
        assert!(is_excluded_path(Path::new("/a/node_modules/b/c.ts"), &excludes));
        assert!(is_excluded_path(Path::new("dist"), &excludes));
        assert!(!is_excluded_path(Path::new("/a/distant/c.ts"), &excludes));
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let f = filter(&["ts"]);
        assert!(f.has_target_ext(Path::new("Foo.TS")));
        assert!(!f.has_target_ext(Path::new("foo.tsx")));
        assert!(!f.has_target_ext(Path::new("ts")));
    }

    #[test]
    fn test_skip_fragments_are_case_insensitive() {
        let f = filter(&["ts"]);
        assert!(f.is_skipped_by_name(Path::new("/x/a.SPEC.ts")));
        assert!(f.is_skipped_by_name(Path::new("b.test.ts")));
        assert!(!f.is_skipped_by_name(Path::new("/x.spec./a.ts")));
    }

    #[test]
    fn test_typescript_rule_uses_extension_and_fragment() {
        let f = FileFilter::new(
            crate::cli::default_excludes(),
            BTreeSet::from([".ts".to_string()]),
            vec![".spec.ts".to_string()],
        );
        // A bare dotfile has no extension.
        assert!(!f.accepts_file(Path::new("/w/.ts")));
        assert!(f.accepts_file(Path::new("/w/a.ts")));
        assert!(!f.accepts_file(Path::new("/w/x.spec.ts.ts")));
        assert!(!f.accepts_file(Path::new("/w/a.Spec.TS")));
    }

    #[test]
    fn test_walk_default_scenario() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("src/a.ts"));
        touch(&root.join("src/a.spec.ts"));
        touch(&root.join("node_modules/b.ts"));

        let files = collect_files(&[root.to_path_buf()], &filter(&["ts"])).unwrap();
        assert_eq!(files, vec![root.join("src/a.ts")]);
    }

    #[test]
    fn test_walk_prunes_nested_excluded_dirs() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("pkg/lib/dist/out.js"));
        touch(&root.join("pkg/lib/src/in.js"));
        touch(&root.join("pkg/node_modules/x/y/z.js"));

        let files = walk(root, &filter(&["js"])).unwrap();
        assert_eq!(files, vec![root.join("pkg/lib/src/in.js")]);
    }

    #[test]
    fn test_walk_root_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("main.py");
        touch(&file);

        assert_eq!(walk(&file, &filter(&["py"])).unwrap(), vec![file.clone()]);
        assert!(walk(&file, &filter(&["rs"])).unwrap().is_empty());
    }

    #[test]
    fn test_walk_excluded_root_yields_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("dist");
        touch(&root.join("bundle.js"));

        assert!(walk(&root, &filter(&["js"])).unwrap().is_empty());
        assert!(walk(&root.join("bundle.js"), &filter(&["js"])).unwrap().is_empty());
    }

    #[test]
    fn test_walk_missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        let files = walk(&dir.path().join("nope"), &filter(&["ts"])).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_empty_extension_set_matches_nothing() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.ts"));
        assert!(walk(dir.path(), &filter(&[])).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_skips_symlink_cycles() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("src/a.rs"));
        std::os::unix::fs::symlink(root, root.join("src/loop")).unwrap();
        std::os::unix::fs::symlink(root.join("src/a.rs"), root.join("src/link.rs")).unwrap();

        let files = walk(root, &filter(&["rs"])).unwrap();
        assert_eq!(files, vec![root.join("src/a.rs")]);
    }

    #[test]
    fn test_sort_unique() {
        let files = vec![
            PathBuf::from("/w/b.ts"),
            PathBuf::from("/w/a/../b.ts"),
            PathBuf::from("/w/a-b.ts"),
            PathBuf::from("/w/a/z.ts"),
        ];
        assert_eq!(
            sort_unique(files),
            vec![
                PathBuf::from("/w/a-b.ts"),
                PathBuf::from("/w/a/z.ts"),
                PathBuf::from("/w/b.ts"),
            ]
        );
    }
}
