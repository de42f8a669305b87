//! URL → PDF: probe, then render through a headless browser.
//!
//! The probe is a plain GET with a short timeout; an HTTP error status
//! fails fast and no browser is started. Rendering is delegated to a
//! [`RenderEngine`] and bounded by a hard wall-clock limit. The engine
//! writes into a staged temp file, so a timed-out or failed render leaves
//! no file behind.

use super::{persist, stage, Converter};
use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::{ConversionCause, ConversionError, RenderError};
use crate::pipeline::input::domain_base_name;
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// User agent sent with the reachability probe.
pub const PROBE_USER_AGENT: &str = "Mozilla/5.0";

/// Renders a web page into a PDF file.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Render `url` into the (existing, empty) file at `out`. `timeout` is
    /// the caller's wall-clock budget; the caller enforces it as well.
    async fn render(&self, url: &Url, out: &Path, timeout: Duration) -> Result<(), RenderError>;
}

/// Headless Chromium with `--print-to-pdf`.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    binary: PathBuf,
}

impl ChromiumEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn render(&self, url: &Url, out: &Path, timeout: Duration) -> Result<(), RenderError> {
        let child = Command::new(&self.binary)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--timeout={}", timeout.as_millis()))
            .arg(format!("--print-to-pdf={}", out.display()))
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout { secs: timeout.as_secs() })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Exited {
                status: output.status.to_string(),
                stderr: stderr.lines().last().unwrap_or_default().trim().to_string(),
            });
        }
        if tokio::fs::metadata(out).await?.len() == 0 {
            return Err(RenderError::EmptyOutput);
        }
        Ok(())
    }
}

pub struct UrlConverter {
    url: Url,
    output_dir: PathBuf,
    probe_timeout: Duration,
    render_timeout: Duration,
    engine: Arc<dyn RenderEngine>,
}

impl UrlConverter {
    pub fn new(url: Url, config: &IngestConfig) -> Self {
        let engine: Arc<dyn RenderEngine> = match &config.render_engine {
            Some(engine) => Arc::clone(engine),
            None => Arc::new(ChromiumEngine::new(&config.chromium_path)),
        };
        Self {
            url,
            output_dir: config.output_dir.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            render_timeout: Duration::from_secs(config.render_timeout_secs),
            engine,
        }
    }
}

#[async_trait]
impl Converter for UrlConverter {
    async fn convert(&self, ctx: &IngestContext) -> Result<PathBuf, ConversionError> {
        let fail = |cause: ConversionCause| ConversionError::new(self.url.as_str(), cause);

        // ── Step 1: Validate ─────────────────────────────────────────────
        validate(&self.url).map_err(fail)?;

        // ── Step 2: Probe ────────────────────────────────────────────────
        let t = std::time::Instant::now();
        probe(&self.url, self.probe_timeout).await.map_err(fail)?;
        debug!(request_id = %ctx.request_id(), "Probe of {} ok in {}ms", self.url, t.elapsed().as_millis());

        // ── Step 3: Render into a staged file ────────────────────────────
        let staged = stage(&self.output_dir).await.map_err(fail)?;
        let rendered = tokio::time::timeout(
            self.render_timeout,
            self.engine.render(&self.url, &staged, self.render_timeout),
        )
        .await;
        match rendered {
            Err(_) => {
                warn!(request_id = %ctx.request_id(), "Render of {} timed out", self.url);
                return Err(fail(ConversionCause::RenderTimeout {
                    secs: self.render_timeout.as_secs(),
                }));
            }
            Ok(Err(e)) => return Err(fail(ConversionCause::Render(e))),
            Ok(Ok(())) => {}
        }

        let path = persist(staged, &self.output_dir, &domain_base_name(&self.url)).map_err(fail)?;
        info!(request_id = %ctx.request_id(), "Rendered {} in {}ms", self.url, t.elapsed().as_millis());
        Ok(path)
    }
}

/// Only absolute `http`/`https` URLs with a host are rendered.
pub fn validate(url: &Url) -> Result<(), ConversionCause> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConversionCause::InvalidUrl(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConversionCause::InvalidUrl("missing host".into()));
    }
    Ok(())
}

/// GET the page once; any status ≥ 400 makes it unavailable.
pub async fn probe(url: &Url, timeout: Duration) -> Result<(), ConversionCause> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(PROBE_USER_AGENT)
        .build()
        .map_err(|e| ConversionCause::Connection(e.to_string()))?;

    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            ConversionCause::ProbeTimeout { secs: timeout.as_secs() }
        } else {
            ConversionCause::Connection(e.to_string())
        }
    })?;

    let status = response.status().as_u16();
    if status >= 400 {
        return Err(ConversionCause::Unavailable { status });
    }
    Ok(())
}
