//! Binding to the pdfium shared library.
//!
//! Every pdfium call in the crate runs inside `spawn_blocking` and binds
//! through [`bind_pdfium`]; documents borrow the returned [`Pdfium`] and are
//! closed when they go out of scope, so no handle outlives the blocking task
//! that opened it.
//!
//! Resolution order:
//! 1. `PDFIUM_LIB_PATH`: an explicit library file or directory.
//! 2. The platform library name in the current directory.
//! 3. The system library search path.

use crate::error::IngestError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an existing pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium using the resolution order above.
pub fn bind_pdfium() -> Result<Pdfium, IngestError> {
    if let Some(path) = std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        let lib = library_file(Path::new(&path));
        debug!("Binding pdfium from {}", lib.display());
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| IngestError::PdfiumBindingFailed(format!("{}: {e}", lib.display())));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| IngestError::PdfiumBindingFailed(e.to_string()))
}

/// Whether pdfium can be bound in this process.
pub fn pdfium_available() -> bool {
    bind_pdfium().is_ok()
}

/// Accept either the library file itself or the directory containing it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}
