//! Input routing: classify a user-supplied path or URL.
//!
//! A well-formed URL (scheme and host) wins over any local-path check, so
//! `https://example.com/report.pdf` is a web page to render, never a file.
//! Local files are classified by extension first and by magic bytes second.
//!
//! This module also owns the naming rule for converted outputs: `<base>.pdf`
//! in the output directory, with a unix-seconds suffix (and then a counter)
//! when the name is taken.

use crate::error::IngestError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Detected input kind. `Unknown` never reaches a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Pdf,
    Image,
    Web,
    Markdown,
    Presentation,
    Unknown,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::Pdf => "pdf",
            InputKind::Image => "image",
            InputKind::Web => "web",
            InputKind::Markdown => "markdown",
            InputKind::Presentation => "presentation",
            InputKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Extension table, lower-case without the dot.
const EXTENSIONS: &[(&str, InputKind)] = &[
    ("jpg", InputKind::Image),
    ("jpeg", InputKind::Image),
    ("png", InputKind::Image),
    ("bmp", InputKind::Image),
    ("tiff", InputKind::Image),
    ("gif", InputKind::Image),
    ("html", InputKind::Web),
    ("htm", InputKind::Web),
    ("pptx", InputKind::Presentation),
    ("md", InputKind::Markdown),
    ("markdown", InputKind::Markdown),
    ("pdf", InputKind::Pdf),
];

/// A routed input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Url(Url),
    Local { path: PathBuf, kind: InputKind },
}

impl Input {
    /// The kind reported for this input; URLs are web content.
    pub fn kind(&self) -> InputKind {
        match self {
            Input::Url(_) => InputKind::Web,
            Input::Local { kind, .. } => *kind,
        }
    }

    /// Whether the input is already the canonical PDF.
    pub fn is_canonical(&self) -> bool {
        matches!(self, Input::Local { kind: InputKind::Pdf, .. })
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Url(url) => write!(f, "{url} (url)"),
            Input::Local { path, kind } => write!(f, "{} ({kind})", path.display()),
        }
    }
}

/// Parse `input` as a routable URL: any scheme, but a host is required.
pub fn parse_url(input: &str) -> Option<Url> {
    let url = Url::parse(input.trim()).ok()?;
    (!url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty())).then_some(url)
}

/// Route an input string.
///
/// # Errors
/// * [`IngestError::InvalidInput`] for an empty string.
/// * [`IngestError::FileNotFound`] / [`IngestError::PermissionDenied`] for
///   unreadable local paths.
/// * [`IngestError::UnsupportedFormat`] when neither the extension nor the
///   content identifies the file.
pub fn detect(input: &str) -> Result<Input, IngestError> {
    if input.trim().is_empty() {
        return Err(IngestError::InvalidInput {
            input: input.to_string(),
        });
    }

    if let Some(url) = parse_url(input) {
        debug!("Routed {input} as URL");
        return Ok(Input::Url(url));
    }

    let path = PathBuf::from(input);
    if !path.exists() {
        return Err(IngestError::FileNotFound { path });
    }
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied { path });
        }
        Err(_) => return Err(IngestError::FileNotFound { path }),
    }

    match detect_kind(&path) {
        InputKind::Unknown => Err(IngestError::UnsupportedFormat { path }),
        kind => {
            debug!("Routed {} as {kind}", path.display());
            Ok(Input::Local { path, kind })
        }
    }
}

/// Classify an existing local file: extension table, then magic bytes.
pub fn detect_kind(path: &Path) -> InputKind {
    if let Some(kind) = kind_from_extension(path) {
        return kind;
    }
    match infer::get_from_path(path) {
        Ok(Some(t)) => kind_from_mime(t.mime_type()),
        _ => InputKind::Unknown,
    }
}

fn kind_from_extension(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, kind)| *kind)
}

fn kind_from_mime(mime: &str) -> InputKind {
    if mime.starts_with("image/") {
        InputKind::Image
    } else if mime == "application/pdf" {
        InputKind::Pdf
    } else {
        InputKind::Unknown
    }
}

// ── Output naming ─────────────────────────────────────────────────────────

/// Longest base name derived from a URL host.
const MAX_DOMAIN_BASE: usize = 30;

/// Base name for a URL: host without `www.`, `.`/`-` → `_`, at most 30
/// characters, `website` when nothing is left.
pub fn domain_base_name(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let base: String = host
        .chars()
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .take(MAX_DOMAIN_BASE)
        .collect();
    if base.is_empty() {
        "website".to_string()
    } else {
        base
    }
}

/// Base name for a local file: its stem.
pub fn file_base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Seconds since the unix epoch, used to disambiguate taken names.
pub fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Output names in the order they are tried: `<dir>/<base>.<ext>`, then
/// `<base>_<secs>.<ext>`, then `<base>_<secs>_<n>.<ext>` for `n = 1, 2, ..`.
///
/// The sequence is endless. Callers claim a name atomically and move on to
/// the next candidate when it is taken.
pub fn output_candidates(dir: &Path, base: &str, ext: &str, secs: u64) -> impl Iterator<Item = PathBuf> {
    let dir = dir.to_path_buf();
    let plain = dir.join(format!("{base}.{ext}"));
    let stamped = dir.join(format!("{base}_{secs}.{ext}"));
    let (base, ext) = (base.to_string(), ext.to_string());
    [plain, stamped]
        .into_iter()
        .chain((1u64..).map(move |n| dir.join(format!("{base}_{secs}_{n}.{ext}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn urls_take_precedence() {
        let input = detect("https://example.com/report.pdf").unwrap();
        assert!(matches!(input, Input::Url(_)));
        assert_eq!(input.kind(), InputKind::Web);
        assert!(!input.is_canonical());
    }

    #[test]
    fn url_without_host_is_not_a_url() {
        assert!(parse_url("file:///tmp/a.pdf").is_none());
        assert!(parse_url("C:\\docs\\a.pdf").is_none());
        assert!(parse_url("notes.md").is_none());
        assert!(parse_url("ftp://files.example.com/a").is_some());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = detect("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }

    #[test]
    fn empty_input_is_invalid() {
        assert!(matches!(detect("  ").unwrap_err(), IngestError::InvalidInput { .. }));
    }

    #[test]
    fn extension_table_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for (name, kind) in [
            ("a.JPG", InputKind::Image),
            ("b.htm", InputKind::Web),
            ("c.Markdown", InputKind::Markdown),
            ("d.pptx", InputKind::Presentation),
            ("e.pdf", InputKind::Pdf),
        ] {
            let p = dir.path().join(name);
            std::fs::write(&p, b"x").unwrap();
            assert_eq!(detect_kind(&p), kind, "{name}");
        }
    }

    #[test]
    fn image_input_routes_to_image() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("photo.png");
        std::fs::write(&p, PNG_MAGIC).unwrap();
        let input = detect(p.to_str().unwrap()).unwrap();
        assert_eq!(input.kind(), InputKind::Image);
    }

    #[test]
    fn unknown_extension_falls_back_to_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("scan.dat");
        std::fs::write(&img, PNG_MAGIC).unwrap();
        assert_eq!(detect_kind(&img), InputKind::Image);

        let pdf = dir.path().join("export.bin");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        assert_eq!(detect_kind(&pdf), InputKind::Pdf);
        assert!(detect(pdf.to_str().unwrap()).unwrap().is_canonical());
    }

    #[test]
    fn unresolved_kind_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("notes.xyz");
        std::fs::write(&p, b"plain words").unwrap();
        assert!(matches!(detect(p.to_str().unwrap()).unwrap_err(), IngestError::UnsupportedFormat { .. }));
    }

    #[test]
    fn domain_base_names() {
        let base = |s: &str| domain_base_name(&Url::parse(s).unwrap());
        assert_eq!(base("https://www.example-site.co.uk/page"), "example_site_co_uk");
        assert_eq!(base("http://localhost:8080/"), "localhost");
        assert_eq!(
            base("https://a-very-long-subdomain.with-many-parts.example.com"),
            "a_very_long_subdomain_with_man"
        );
    }

    #[test]
    fn candidates_add_timestamp_then_counter() {
        let dir = Path::new("/out");
        let names: Vec<PathBuf> = output_candidates(dir, "deck", "pdf", 1700000000).take(4).collect();
        assert_eq!(
            names,
            vec![
                dir.join("deck.pdf"),
                dir.join("deck_1700000000.pdf"),
                dir.join("deck_1700000000_1.pdf"),
                dir.join("deck_1700000000_2.pdf"),
            ]
        );
    }

    #[test]
    fn file_base_name_is_stem() {
        assert_eq!(file_base_name(Path::new("/tmp/slides.final.pptx")), "slides.final");
    }
}
