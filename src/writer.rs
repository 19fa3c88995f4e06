use crate::cli::LangMode;
use crate::utils::{FENCE, LINE_ENDING, get_language_tag, relative_to};
use anyhow::{Context, Result, bail};
use content_inspector::{ContentType, inspect};
use log::debug;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Literal that opens every header line.
pub const HEADER_PREFIX: &str = "file: ";

/// Writes each file as a header line followed by a fenced block.
pub struct FencedWriter<W: AsyncWrite + Unpin> {
    writer: BufWriter<W>,
    lang: LangMode,
    /// `Some(root)` shows paths relative to `root`, `None` shows basenames.
    relative_root: Option<PathBuf>,
}

impl<W: AsyncWrite + Unpin> FencedWriter<W> {
    pub fn new(inner: W, lang: LangMode, relative_root: Option<PathBuf>) -> Self {
        Self {
            writer: BufWriter::new(inner),
            lang,
            relative_root,
        }
    }

    fn display_name<'a>(&self, path: &'a Path) -> Cow<'a, str> {
        match &self.relative_root {
            Some(root) => Cow::Owned(relative_to(path, root).to_string_lossy().into_owned()),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| path.to_string_lossy()),
        }
    }

    fn fence_tag<'a>(&'a self, path: &Path) -> &'a str {
        match &self.lang {
            LangMode::Auto => get_language_tag(path),
            LangMode::None => "",
            LangMode::Literal(tag) => tag.as_str(),
        }
    }

    /// Appends one record for `path`. Fails if the file is unreadable or not text.
    pub async fn write_entry(&mut self, path: &Path) -> Result<()> {
        let display = self.display_name(path).into_owned();
        debug!("Writing file: {display}");

        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        if inspect(&bytes) == ContentType::BINARY {
            bail!("{} is not a text file", path.display());
        }
        let content = String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?;

        let header = format!(
            "{HEADER_PREFIX}{display}{LINE_ENDING}{FENCE}{}{LINE_ENDING}",
            self.fence_tag(path)
        );
        self.writer
            .write_all(header.as_bytes())
            .await
            .with_context(|| format!("Failed to write header for {display}"))?;

        self.writer
            .write_all(content.as_bytes())
            .await
            .with_context(|| format!("Failed to write content of {display}"))?;

        // `\r\n` also ends with `\n`.
        if !content.ends_with('\n') {
            self.writer
                .write_all(LINE_ENDING.as_bytes())
                .await
                .with_context(|| format!("Failed to terminate content of {display}"))?;
        }

        self.writer
            .write_all(format!("{FENCE}{LINE_ENDING}").as_bytes())
            .await
            .with_context(|| format!("Failed to write closing code fence for {display}"))?;

        Ok(())
    }

    /// Flushes buffered output and shuts the destination down.
    pub async fn finish(mut self) -> Result<W> {
        self.writer.flush().await.context("Failed to flush output")?;
        self.writer
            .shutdown()
            .await
            .context("Failed to close output")?;
        Ok(self.writer.into_inner())
    }
}

/// Truncates `out_path` and writes every file of `files`, in order, as one record.
///
/// Returns the number of records written.
pub async fn write_combined(
    files: &[PathBuf],
    out_path: &Path,
    lang: LangMode,
    relative_root: Option<PathBuf>,
) -> Result<usize> {
    let file = fs::File::create(out_path)
        .await
        .with_context(|| format!("Failed to create output file {}", out_path.display()))?;
    let mut writer = FencedWriter::new(file, lang, relative_root);

    for path in files {
        writer.write_entry(path).await?;
    }

    writer.finish().await?;
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn render(
        path: &Path,
        lang: LangMode,
        relative: Option<PathBuf>,
    ) -> anyhow::Result<String> {
        let mut writer = FencedWriter::new(Vec::new(), lang, relative);
        writer.write_entry(path).await?;
        let bytes = writer.finish().await?;
        Ok(String::from_utf8(bytes)?)
    }

    #[tokio::test]
    async fn test_injects_exactly_one_terminator() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.py");
        std::fs::write(&path, "print(1)")?;

        let out = render(&path, LangMode::Auto, None).await?;
        assert_eq!(
            out,
            format!("file: a.py{LINE_ENDING}```python{LINE_ENDING}print(1){LINE_ENDING}```{LINE_ENDING}")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_no_terminator_when_content_ends_with_newline() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn main() {}\r\n")?;

        let out = render(&path, LangMode::Auto, None).await?;
        assert!(out.ends_with(&format!("fn main() {{}}\r\n```{LINE_ENDING}")));
        Ok(())
    }

    #[tokio::test]
    async fn test_lang_none_gives_bare_fence() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.py");
        std::fs::write(&path, "x = 1\n")?;

        let out = render(&path, LangMode::None, None).await?;
        let fence_line = out.lines().nth(1).unwrap();
        assert_eq!(fence_line, "```");
        Ok(())
    }

    #[tokio::test]
    async fn test_literal_lang_and_relative_header() -> anyhow::Result<()> {
        let dir = tempdir()?;
        std::fs::create_dir(dir.path().join("src"))?;
        let path = dir.path().join("src/a.py");
        std::fs::write(&path, "x = 1\n")?;

        let out = render(
            &path,
            LangMode::Literal("text".to_string()),
            Some(dir.path().to_path_buf()),
        )
        .await?;
        let mut lines = out.lines();
        let expected_name = Path::new("src").join("a.py");
        assert_eq!(
            lines.next().unwrap(),
            format!("file: {}", expected_name.display())
        );
        assert_eq!(lines.next().unwrap(), "```text");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_extension_has_no_tag() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello\n")?;

        let out = render(&path, LangMode::Auto, None).await?;
        assert_eq!(out.lines().nth(1).unwrap(), "```");
        Ok(())
    }

    #[tokio::test]
    async fn test_binary_file_fails() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("blob.js");
        std::fs::write(&path, [0x00, 0xFF, 0xAA, 0x55])?;

        let mut writer = FencedWriter::new(Vec::new(), LangMode::Auto, None);
        assert!(writer.write_entry(&path).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_fails() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut writer = FencedWriter::new(Vec::new(), LangMode::Auto, None);
        let err = writer
            .write_entry(&dir.path().join("gone.js"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
        Ok(())
    }
}
