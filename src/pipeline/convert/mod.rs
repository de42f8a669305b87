//! Format converters: turn every supported input into a canonical PDF.
//!
//! ```text
//!  Input::Url ──────────────► UrlConverter ──┐
//!  Input::Local{Image} ─────► ImageConverter ├──► <output_dir>/<base>.pdf
//!  Input::Local{Web} ───────► HtmlConverter  │
//!  Input::Local{Markdown} ──► MarkdownConverter
//!  Input::Local{Presentation} ► SlidesConverter ┘
//!  Input::Local{Pdf} ───────► (already canonical)
//! ```
//!
//! Every converter writes into a temp file inside the output directory and
//! renames it to its final, collision-free name only once the document is
//! complete. A failed conversion leaves nothing behind.

pub mod html;
pub mod image;
pub mod layout;
pub mod markdown;
pub mod slides;
pub mod url;

use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::{ConversionCause, ConversionError, IngestError};
use crate::pipeline::input::{output_candidates, unix_secs, Input, InputKind};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info};

pub use self::html::HtmlConverter;
pub use self::image::ImageConverter;
pub use self::markdown::MarkdownConverter;
pub use self::slides::SlidesConverter;
pub use self::url::{ChromiumEngine, RenderEngine, UrlConverter};

/// Produces the canonical PDF for one input.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert and return the path of the written PDF.
    async fn convert(&self, ctx: &IngestContext) -> Result<PathBuf, ConversionError>;
}

/// Pick the converter for a routed input. `None` means the input is
/// already a PDF.
pub fn converter_for(input: &Input, config: &IngestConfig) -> Result<Option<Box<dyn Converter>>, IngestError> {
    let converter: Box<dyn Converter> = match input {
        Input::Url(url) => Box::new(UrlConverter::new(url.clone(), config)),
        Input::Local { path, kind } => match kind {
            InputKind::Pdf => return Ok(None),
            InputKind::Image => Box::new(ImageConverter::new(path, config)),
            InputKind::Web => Box::new(HtmlConverter::new(path, config)),
            InputKind::Markdown => Box::new(MarkdownConverter::new(path, config)),
            InputKind::Presentation => Box::new(SlidesConverter::new(path, config)),
            InputKind::Unknown => return Err(IngestError::UnsupportedFormat { path: path.clone() }),
        },
    };
    Ok(Some(converter))
}

/// Resolve the canonical PDF for `input`, converting when needed.
pub async fn to_canonical(ctx: &IngestContext, input: &Input, config: &IngestConfig) -> Result<PathBuf, IngestError> {
    match converter_for(input, config)? {
        None => match input {
            Input::Local { path, .. } => Ok(path.clone()),
            Input::Url(url) => Err(IngestError::Internal(format!("no converter for {url}"))),
        },
        Some(converter) => {
            let start = std::time::Instant::now();
            let path = converter.convert(ctx).await?;
            info!(
                request_id = %ctx.request_id(),
                "Converted {input} → {} in {}ms",
                path.display(),
                start.elapsed().as_millis()
            );
            Ok(path)
        }
    }
}

// ── Staging ───────────────────────────────────────────────────────────────

/// Create `output_dir` and an empty temp PDF inside it. The file is deleted
/// when the returned handle drops.
pub(crate) async fn stage(output_dir: &Path) -> Result<TempPath, ConversionCause> {
    tokio::fs::create_dir_all(output_dir).await?;
    let file = tempfile::Builder::new()
        .prefix(".doc2llm-")
        .suffix(".pdf")
        .tempfile_in(output_dir)?;
    Ok(file.into_temp_path())
}

/// Move a finished temp PDF to its unique final name.
pub(crate) fn persist(staged: TempPath, output_dir: &Path, base: &str) -> Result<PathBuf, ConversionCause> {
    let target = persist_first_free(staged, output_candidates(output_dir, base, "pdf", unix_secs()))?;
    debug!("Persisted canonical PDF {}", target.display());
    Ok(target)
}

/// Claim the first candidate that does not exist yet. Taken names are never
/// overwritten, even when another conversion claims one after it was listed.
fn persist_first_free(
    mut staged: TempPath,
    candidates: impl IntoIterator<Item = PathBuf>,
) -> Result<PathBuf, ConversionCause> {
    for target in candidates {
        match staged.persist_noclobber(&target) {
            Ok(()) => return Ok(target),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => staged = e.path,
            Err(e) => return Err(ConversionCause::Io(e.error)),
        }
    }
    Err(ConversionCause::Io(std::io::Error::other("no free output name")))
}

/// Stage a temp file, fill it with `write` on the blocking pool, and
/// persist it as `<output_dir>/<base>.pdf`.
pub(crate) async fn write_staged<F>(
    source_ref: &str,
    output_dir: &Path,
    base: &str,
    write: F,
) -> Result<PathBuf, ConversionError>
where
    F: FnOnce(&Path) -> Result<(), ConversionCause> + Send + 'static,
{
    let fail = |cause: ConversionCause| ConversionError::new(source_ref, cause);

    let staged = stage(output_dir).await.map_err(fail)?;
    let tmp = staged.to_path_buf();
    tokio::task::spawn_blocking(move || write(tmp.as_path()))
        .await
        .map_err(|e| fail(ConversionCause::Io(std::io::Error::other(format!("conversion task panicked: {e}")))))?
        .map_err(fail)?;

    persist(staged, output_dir, base).map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    #[tokio::test]
    async fn pdf_input_is_already_canonical() {
        let config = IngestConfig::default();
        let input = Input::Local {
            path: PathBuf::from("report.pdf"),
            kind: InputKind::Pdf,
        };
        assert!(converter_for(&input, &config).unwrap().is_none());
        let ctx = IngestContext::new(None);
        assert_eq!(to_canonical(&ctx, &input, &config).await.unwrap(), PathBuf::from("report.pdf"));
    }

    #[test]
    fn every_other_kind_has_a_converter() {
        let config = IngestConfig::default();
        for kind in [InputKind::Image, InputKind::Web, InputKind::Markdown, InputKind::Presentation] {
            let input = Input::Local {
                path: PathBuf::from("x"),
                kind,
            };
            assert!(converter_for(&input, &config).unwrap().is_some(), "{kind}");
        }
        let url = Input::Url(Url::parse("https://example.com").unwrap());
        assert!(converter_for(&url, &config).unwrap().is_some());
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let input = Input::Local {
            path: PathBuf::from("x.bin"),
            kind: InputKind::Unknown,
        };
        assert!(matches!(
            converter_for(&input, &IngestConfig::default()),
            Err(IngestError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn staged_write_persists_under_unique_name() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("assets");

        let first = write_staged("a", &out, "doc", |p| Ok(std::fs::write(p, b"%PDF-1.4")?))
            .await
            .unwrap();
        let second = write_staged("b", &out, "doc", |p| Ok(std::fs::write(p, b"%PDF-1.4")?))
            .await
            .unwrap();

        assert_eq!(first, out.join("doc.pdf"));
        assert_ne!(first, second);
        assert!(second.file_name().unwrap().to_string_lossy().starts_with("doc_"));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn name_taken_after_planning_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        // Both conversions plan their names before either has persisted.
        let planned_a = output_candidates(out, "deck", "pdf", 1700000000);
        let planned_b = output_candidates(out, "deck", "pdf", 1700000000);

        let a = stage(out).await.unwrap();
        std::fs::write(&a, b"%PDF-A").unwrap();
        let b = stage(out).await.unwrap();
        std::fs::write(&b, b"%PDF-B").unwrap();

        let first = persist_first_free(a, planned_a).unwrap();
        let second = persist_first_free(b, planned_b).unwrap();

        assert_eq!(first, out.join("deck.pdf"));
        assert_eq!(second, out.join("deck_1700000000.pdf"));
        assert_eq!(std::fs::read(&first).unwrap(), b"%PDF-A");
        assert_eq!(std::fs::read(&second).unwrap(), b"%PDF-B");
        assert_eq!(std::fs::read_dir(out).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_staged("deck.pptx", dir.path(), "deck", |p| {
            std::fs::write(p, b"partial")?;
            Err(ConversionCause::Presentation("truncated".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(err.source_ref, "deck.pptx");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
