//! Page rasterization through poppler's `pdftoppm`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::tools::{args, ToolRunner};
use crate::error::ExtractionError;

pub const RASTERIZER: &str = "pdftoppm";

/// File prefix for rendered pages; pdftoppm appends `-<n>.png`.
const PAGE_PREFIX: &str = "page";

/// Install instructions for poppler on the current platform.
pub fn install_hint() -> String {
    install_hint_for(std::env::consts::OS)
}

pub fn install_hint_for(os: &str) -> String {
    let command = match os {
        "windows" => "choco install poppler -y",
        "macos" => "brew install poppler",
        _ => "sudo apt update && sudo apt install -y poppler-utils",
    };
    format!(
        "Install poppler (provides pdftoppm) with `{}` and make sure it is on PATH.",
        command
    )
}

/// Renders every page of `pdf` to PNG inside `out_dir`, returning the page
/// images in page order.
pub async fn rasterize(
    runner: &dyn ToolRunner,
    pdf: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<Vec<PathBuf>, ExtractionError> {
    let dpi_arg = dpi.to_string();
    let prefix = out_dir.join(PAGE_PREFIX);
    let tool_args = args([
        OsStr::new("-png"),
        OsStr::new("-r"),
        OsStr::new(&dpi_arg),
        pdf.as_os_str(),
        prefix.as_os_str(),
    ]);

    let output = runner.run(RASTERIZER, &tool_args).await.map_err(|e| {
        if e.is_not_found() {
            ExtractionError::RasterizerMissing {
                hint: install_hint(),
            }
        } else {
            ExtractionError::RasterizeFailed(e)
        }
    })?;
    output
        .require_success(RASTERIZER)
        .map_err(ExtractionError::RasterizeFailed)?;

    let pages = collect_pages(out_dir).map_err(|e| ExtractionError::Scratch {
        path: out_dir.to_path_buf(),
        source: e,
    })?;
    if pages.is_empty() {
        return Err(ExtractionError::NoPagesProduced);
    }

    log::debug!("Rasterized {} page(s)", pages.len());
    Ok(pages)
}

/// Lists `page-*.png` files sorted by name. pdftoppm zero-pads page numbers
/// to a common width, so name order is page order.
fn collect_pages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.starts_with(PAGE_PREFIX)
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("png"))
                    .unwrap_or(false)
        })
        .collect();
    pages.sort();
    Ok(pages)
}
