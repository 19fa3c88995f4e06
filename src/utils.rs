use env_logger::Env;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Code fence delimiter used around every combined file.
pub const FENCE: &str = "```";

/// Line terminator of the host platform.
pub const LINE_ENDING: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Environment variable that overrides the `-v` derived log level.
pub const LOG_ENV: &str = "SRCFENCE_LOG";

pub fn get_language_tag(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "js" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "json" => "json",
        "md" => "markdown",
        "py" => "python",
        "rb" => "ruby",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "rs" => "rust",
        "php" => "php",
        "sh" => "bash",
        "zsh" => "zsh",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        _ => "",
    }
}

/// Lexically resolves `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves `path` against `base` and normalizes the result.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    normalize_path(&base.join(path))
}

/// Computes `path` relative to `base`, using `..` where the two diverge.
///
/// Both paths are expected to be absolute and normalized.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<_> = path.components().collect();
    let base_parts: Vec<_> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

/// Installs the global logger. `-v` raises the default level one step per use.
pub fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // A second initialization (tests, library reuse) is harmless.
    let _ = env_logger::Builder::from_env(Env::default().filter_or(LOG_ENV, level))
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
