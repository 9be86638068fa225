//! Native (embedded) PDF text extraction with lopdf.

use crate::error::ExtractionError;

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Extracts the embedded text layer, one line-terminated block per page.
pub fn extract_native(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    let _span = tracing::debug_span!("processor.pdf.native").entered();

    let doc = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::NativeParse(e.to_string()))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => log::debug!("No text on page {}: {}", page_num, e),
        }
    }

    Ok(text)
}

/// True when the text layer holds something besides whitespace and
/// undecodable-font markers.
pub fn has_usable_text(text: &str) -> bool {
    !text
        .replace(IDENTITY_H_PATTERN, "")
        .trim()
        .is_empty()
}

/// Native extraction that treats parse failures as "no text".
pub fn usable_native_text(pdf_bytes: &[u8]) -> Option<String> {
    match extract_native(pdf_bytes) {
        Ok(text) if has_usable_text(&text) => Some(text),
        Ok(_) => {
            log::debug!("PDF has no embedded text layer");
            None
        }
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}
