//! Structural PDF repair: `qpdf` first, Ghostscript as the heavier fallback.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::tools::{args, ToolRunner};

/// qpdf exit status for "succeeded with warnings".
const QPDF_EXIT_WARNINGS: i32 = 3;

/// Tries to rewrite `input` into a well-formed PDF inside `scratch`.
///
/// Returns the repaired file, or `None` when neither tool is available or
/// both fail. Repair problems never abort extraction.
pub async fn repair(runner: &dyn ToolRunner, input: &Path, scratch: &Path) -> Option<PathBuf> {
    let qpdf_out = scratch.join("repaired_qpdf.pdf");
    match runner
        .run("qpdf", &args([input.as_os_str(), qpdf_out.as_os_str()]))
        .await
    {
        Ok(output) => {
            let accepted = output.success() || output.status == Some(QPDF_EXIT_WARNINGS);
            if accepted && qpdf_out.exists() {
                log::info!("PDF repaired with qpdf");
                return Some(qpdf_out);
            }
            log::warn!(
                "qpdf repair failed with status {:?}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Err(e) => log::warn!("qpdf repair unavailable: {}", e),
    }

    let gs_out = scratch.join("repaired_gs.pdf");
    let gs_args = args([
        OsStr::new("-o"),
        gs_out.as_os_str(),
        OsStr::new("-sDEVICE=pdfwrite"),
        OsStr::new("-dPDFSETTINGS=/prepress"),
        input.as_os_str(),
    ]);
    match runner.run("gs", &gs_args).await {
        Ok(output) if output.success() && gs_out.exists() => {
            log::info!("PDF repaired with Ghostscript");
            Some(gs_out)
        }
        Ok(output) => {
            log::warn!(
                "Ghostscript repair failed with status {:?}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(e) => {
            log::warn!("Ghostscript repair unavailable: {}", e);
            None
        }
    }
}
