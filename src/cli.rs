use crate::filewalker::{FileFilter, normalize_ext};
use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Output file used when `-o` is absent or given without a value.
pub const DEFAULT_OUT: &str = "output.txt";

/// Directory/file name components excluded by the combiners.
pub fn default_excludes() -> BTreeSet<String> {
    ["node_modules", "dist"].into_iter().map(String::from).collect()
}

/// Name fragments that mark test files for the generic combiner.
pub fn default_skip_name_fragments() -> Vec<String> {
    vec![".spec.".to_string(), ".test.".to_string()]
}

/// Directory/file name components excluded by `srctree`.
pub fn default_tree_excludes() -> BTreeSet<String> {
    ["node_modules", "dist", ".git"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Which combiner front-end is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Extension-generic combiner with the full flag surface.
    Generic,
    /// TypeScript-only combiner: `.ts` files, `.spec.ts` skipped, `typescript` fences.
    TypeScript,
}

/// How the opening fence is tagged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LangMode {
    /// Look the tag up from the file extension.
    #[default]
    Auto,
    /// Bare fence, no tag.
    None,
    /// Always emit this tag.
    Literal(String),
}

impl From<&str> for LangMode {
    fn from(value: &str) -> Self {
        match value {
            "" | "auto" => LangMode::Auto,
            "none" => LangMode::None,
            other => LangMode::Literal(other.to_string()),
        }
    }
}

impl fmt::Display for LangMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LangMode::Auto => f.write_str("auto"),
            LangMode::None => f.write_str("none"),
            LangMode::Literal(tag) => f.write_str(tag),
        }
    }
}

/// Everything a combine run needs. Built once per invocation and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub output_path: PathBuf,
    pub filter: FileFilter,
    pub lang: LangMode,
    /// Headers show the path relative to `project_root` instead of the basename.
    pub show_relative: bool,
    pub pick: bool,
    /// Positional roots, as given on the command line.
    pub paths: Vec<PathBuf>,
    /// Working directory every relative path is resolved against.
    pub project_root: PathBuf,
    pub verbosity: u8,
}

impl Config {
    /// Defaults for the given front-end, rooted at `project_root`.
    pub fn new(preset: Preset, project_root: PathBuf) -> Self {
        let (filter, lang) = match preset {
            Preset::Generic => (
                FileFilter::new(
                    default_excludes(),
                    BTreeSet::new(),
                    default_skip_name_fragments(),
                ),
                LangMode::Auto,
            ),
            Preset::TypeScript => (
                FileFilter::new(
                    default_excludes(),
                    BTreeSet::from([".ts".to_string()]),
                    vec![".spec.ts".to_string()],
                ),
                LangMode::Literal("typescript".to_string()),
            ),
        };

        Self {
            output_path: PathBuf::from(DEFAULT_OUT),
            filter,
            lang,
            show_relative: false,
            pick: false,
            paths: Vec::new(),
            project_root,
            verbosity: 0,
        }
    }
}

fn build_command(preset: Preset) -> Command {
    let (name, about) = match preset {
        Preset::Generic => (
            "combine-files",
            "Combines source files into one text file, each wrapped in a markdown code fence",
        ),
        Preset::TypeScript => (
            "combine-ts",
            "Combines TypeScript files (skipping .spec.ts) into one text file of markdown code fences",
        ),
    };

    let mut cmd = Command::new(name)
        .version(env!("CARGO_PKG_VERSION"))
        .about(about)
        .args_override_self(true)
        .after_help(match preset {
            Preset::Generic => {
                "Without paths, combines from the current directory (recursively).\n\
                 Each path may be a directory (walked recursively) or a file (kept if it matches --ext).\n\n\
                 Examples:\n  \
                 combine-files src shared/util.py --ext py\n  \
                 combine-files packages/app packages/lib --ext js,ts --relative -o combined.txt\n  \
                 combine-files --lang text --ext js,ts,py\n  \
                 combine-files --pick --ext js,ts"
            }
            Preset::TypeScript => {
                "Without paths, combines from the current directory (recursively).\n\n\
                 Examples:\n  \
                 combine-ts src shared/types.ts\n  \
                 combine-ts packages/app packages/lib --relative -o combined.txt\n  \
                 combine-ts --pick"
            }
        })
        .arg(
            Arg::new("out")
                .short('o')
                .long("out")
                .value_name("FILE")
                .help("Output file path")
                .num_args(0..=1)
                .default_missing_value(DEFAULT_OUT),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .value_name("A,B,C")
                .help("Name components to exclude, added to the defaults (node_modules,dist)")
                .num_args(0..=1)
                .default_missing_value("")
                .action(ArgAction::Append),
        );

    if preset == Preset::Generic {
        cmd = cmd
            .arg(
                Arg::new("ext")
                    .long("ext")
                    .value_name("JS,TS,PY")
                    .help("Extensions to include, with or without the dot; replaces the default set")
                    .num_args(0..=1)
                    .default_missing_value("")
                    .action(ArgAction::Append),
            )
            .arg(
                Arg::new("skip-name")
                    .long("skip-name")
                    .value_name("A,B,C")
                    .help("Skip files whose name contains any fragment, added to the defaults (.spec.,.test.)")
                    .num_args(0..=1)
                    .default_missing_value("")
                    .action(ArgAction::Append),
            )
            .arg(
                Arg::new("lang")
                    .long("lang")
                    .value_name("auto|none|TAG")
                    .help("Fence tag: derive from the extension, omit it, or force TAG")
                    .num_args(0..=1)
                    .default_missing_value("auto"),
            );
    }

    cmd.arg(
        Arg::new("relative")
            .long("relative")
            .help("Show paths relative to the working directory in headers")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("pick")
            .long("pick")
            .help("Interactively choose entries of the current directory when no paths are given")
            .action(ArgAction::SetTrue),
    )
    .arg(verbose_arg())
    .arg(
        Arg::new("paths")
            .value_name("PATHS")
            .help("Files or directories to combine")
            .num_args(0..)
            .action(ArgAction::Append),
    )
}

fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .help("Increase log verbosity (repeatable)")
        .action(ArgAction::Count)
}

/// Splits a comma-separated flag value, trimming and dropping empty items.
fn split_csv(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn all_values<'a>(matches: &'a ArgMatches, id: &str) -> impl Iterator<Item = &'a String> {
    matches
        .try_get_many::<String>(id)
        .ok()
        .flatten()
        .into_iter()
        .flatten()
}

fn config_from_matches(preset: Preset, matches: &ArgMatches, project_root: PathBuf) -> Config {
    let mut config = Config::new(preset, project_root);

    if let Some(out) = matches.get_one::<String>("out") {
        config.output_path = PathBuf::from(if out.is_empty() { DEFAULT_OUT } else { out.as_str() });
    }

    // --exclude: union into the defaults.
    for raw in all_values(matches, "exclude") {
        config.filter.excludes.extend(split_csv(raw));
    }

    // --ext: the last occurrence carrying at least one extension replaces the set.
    for raw in all_values(matches, "ext") {
        let exts: BTreeSet<String> = raw
            .split(',')
            .map(normalize_ext)
            .filter(|e| !e.is_empty())
            .collect();
        if !exts.is_empty() {
            config.filter.extensions = exts;
        }
    }

    // --skip-name: union into the defaults.
    for raw in all_values(matches, "skip-name") {
        for fragment in split_csv(raw) {
            if !config.filter.skip_name_fragments.contains(&fragment) {
                config.filter.skip_name_fragments.push(fragment);
            }
        }
    }

    if let Ok(Some(lang)) = matches.try_get_one::<String>("lang") {
        config.lang = LangMode::from(lang.as_str());
    }

    config.show_relative = matches.get_flag("relative");
    config.pick = matches.get_flag("pick");
    config.verbosity = matches.get_count("verbose");
    config.paths = all_values(matches, "paths").map(PathBuf::from).collect();

    config
}

/// Moves every token that names no known option behind a `--` separator.
///
/// A value-taking option always consumes the next token, even one that starts
/// with `-`. Anything unrecognised, such as `--foo` or `-1`, becomes a path.
fn route_args<I, T>(cmd: &mut Command, args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    cmd.build();
    let cmd = &*cmd;

    let mut args = args.into_iter().map(Into::<OsString>::into);
    let mut flags: Vec<OsString> = args.next().into_iter().collect();
    let mut paths = Vec::new();

    while let Some(raw) = args.next() {
        let Some(token) = raw.to_str().map(str::to_owned) else {
            paths.push(raw);
            continue;
        };

        if token == "--" {
            paths.extend(args.by_ref());
            break;
        }

        if let Some(long) = token.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            match cmd.get_arguments().find(|arg| arg.get_long() == Some(name)) {
                Some(arg) if arg.get_action().takes_values() && !inline => match args.next() {
                    Some(value) => flags.push(with_value(format!("--{name}="), value)),
                    None => flags.push(raw),
                },
                Some(_) => flags.push(raw),
                None => paths.push(raw),
            }
            continue;
        }

        if let Some(shorts) = token.strip_prefix('-').filter(|s| !s.is_empty()) {
            let known: Option<Vec<&Arg>> = shorts
                .chars()
                .map(|c| cmd.get_arguments().find(|arg| arg.get_short() == Some(c)))
                .collect();
            match known.as_deref() {
                Some([arg]) if arg.get_action().takes_values() => match args.next() {
                    Some(value) => {
                        let prefix = match arg.get_long() {
                            Some(long) => format!("--{long}="),
                            None => format!("-{shorts}="),
                        };
                        flags.push(with_value(prefix, value));
                    }
                    None => flags.push(raw),
                },
                Some(found) if found.iter().all(|arg| !arg.get_action().takes_values()) => {
                    flags.push(raw)
                }
                _ => paths.push(raw),
            }
            continue;
        }

        paths.push(raw);
    }

    if !paths.is_empty() {
        flags.push(OsString::from("--"));
        flags.extend(paths);
    }
    flags
}

fn with_value(prefix: String, value: OsString) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(value);
    arg
}

/// Help and version print and exit 0; any other parse error becomes a run failure.
fn exit_or_report(err: clap::Error) -> Result<ArgMatches> {
    if !err.use_stderr() {
        err.exit();
    }
    let rendered = err.render().to_string();
    let message = rendered.trim_end();
    Err(anyhow!("{}", message.strip_prefix("error: ").unwrap_or(message)))
}

/// Parses the process arguments. Help and version exit the process.
pub fn parse_args(preset: Preset) -> Result<Config> {
    let mut cmd = build_command(preset);
    let argv = route_args(&mut cmd, std::env::args_os());
    let matches = cmd.try_get_matches_from(argv).or_else(exit_or_report)?;
    let project_root = std::env::current_dir().context("Failed to get current directory")?;
    Ok(config_from_matches(preset, &matches, project_root))
}

/// Parses an explicit argument list (the first item is the program name).
pub fn parse_args_from<I, T>(preset: Preset, args: I, project_root: PathBuf) -> Result<Config>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut cmd = build_command(preset);
    let argv = route_args(&mut cmd, args);
    let matches = cmd.try_get_matches_from(argv)?;
    Ok(config_from_matches(preset, &matches, project_root))
}

/// Which entry kinds `srctree` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKinds {
    #[default]
    All,
    FilesOnly,
    DirsOnly,
}

/// Options for a `srctree` run.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub target: PathBuf,
    /// `None` writes to stdout.
    pub output_path: Option<PathBuf>,
    pub excludes: BTreeSet<String>,
    /// Deepest level descended into; root children sit at depth 0.
    pub max_depth: Option<usize>,
    pub relative: bool,
    pub list_mode: bool,
    pub kinds: EntryKinds,
    pub project_root: PathBuf,
    pub verbosity: u8,
}

impl TreeConfig {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            target: PathBuf::from("."),
            output_path: None,
            excludes: default_tree_excludes(),
            max_depth: None,
            relative: false,
            list_mode: false,
            kinds: EntryKinds::All,
            project_root,
            verbosity: 0,
        }
    }
}

fn build_tree_command() -> Command {
    Command::new("srctree")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Prints a directory as an ASCII tree or as a flat list of paths")
        .args_override_self(true)
        .after_help(
            "Examples:\n  \
             srctree\n  \
             srctree . --exclude node_modules,dist\n  \
             srctree src --exclude node_modules --exclude dist --max-depth 4\n  \
             srctree . --list --relative -o tree.txt",
        )
        .arg(
            Arg::new("out")
                .short('o')
                .long("out")
                .value_name("FILE")
                .help("Write to FILE instead of stdout")
                .num_args(0..=1)
                .default_missing_value(""),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .value_name("A,B,C")
                .help("Name components to exclude, added to the defaults (node_modules,dist,.git)")
                .num_args(0..=1)
                .default_missing_value("")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("Maximum depth to descend (0 = only the root's entries)")
                .num_args(0..=1),
        )
        .arg(
            Arg::new("relative")
                .long("relative")
                .help("Show paths relative to the working directory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("Print one path per line instead of a tree")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("files-only")
                .long("files-only")
                .help("Only print files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dirs-only")
                .long("dirs-only")
                .help("Only print directories (wins over --files-only)")
                .action(ArgAction::SetTrue),
        )
        .arg(verbose_arg())
        .arg(
            Arg::new("paths")
                .value_name("PATH")
                .help("Directory or file to print (default: .)")
                .num_args(0..)
                .action(ArgAction::Append),
        )
}

fn tree_config_from_matches(matches: &ArgMatches, project_root: PathBuf) -> TreeConfig {
    let mut config = TreeConfig::new(project_root);

    if let Some(target) = all_values(matches, "paths").next() {
        config.target = PathBuf::from(target);
    }

    config.output_path = matches
        .get_one::<String>("out")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    for raw in all_values(matches, "exclude") {
        config.excludes.extend(split_csv(raw));
    }

    if let Some(raw) = matches.get_one::<String>("max-depth") {
        match raw.trim().parse::<usize>() {
            Ok(depth) => config.max_depth = Some(depth),
            Err(_) => log::debug!("Ignoring invalid --max-depth value {raw:?}"),
        }
    }

    config.relative = matches.get_flag("relative");
    config.list_mode = matches.get_flag("list");
    config.kinds = if matches.get_flag("dirs-only") {
        EntryKinds::DirsOnly
    } else if matches.get_flag("files-only") {
        EntryKinds::FilesOnly
    } else {
        EntryKinds::All
    };
    config.verbosity = matches.get_count("verbose");

    config
}

/// Parses the process arguments for `srctree`.
pub fn parse_tree_args() -> Result<TreeConfig> {
    let mut cmd = build_tree_command();
    let argv = route_args(&mut cmd, std::env::args_os());
    let matches = cmd.try_get_matches_from(argv).or_else(exit_or_report)?;
    let project_root = std::env::current_dir().context("Failed to get current directory")?;
    Ok(tree_config_from_matches(&matches, project_root))
}

/// Parses an explicit `srctree` argument list (the first item is the program name).
pub fn parse_tree_args_from<I, T>(args: I, project_root: PathBuf) -> Result<TreeConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut cmd = build_tree_command();
    let argv = route_args(&mut cmd, args);
    let matches = cmd.try_get_matches_from(argv)?;
    Ok(tree_config_from_matches(&matches, project_root))
}
