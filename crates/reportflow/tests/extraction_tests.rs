//! Fallback chain of the text extractor, driven through fake tools.

mod common;

use common::*;
use reportflow::error::ExtractionError;
use reportflow::processor::MOCK_OCR_TEXT;

#[tokio::test]
async fn digital_pdf_uses_embedded_text_without_tools() {
    let harness = TestHarness::new();
    let path = harness.write_input("labs.pdf", &digital_pdf("Glucose 95 mg/dL"));

    let text = harness.extractor(false).extract_text(&path).await.unwrap();

    assert!(text.contains("Glucose 95 mg/dL"));
    assert!(harness.tools.calls().is_empty());
    assert!(harness.ocr.seen().is_empty());
    assert!(harness.scratch_entries().is_empty());
}

#[tokio::test]
async fn scanned_pdf_is_ocrd_page_by_page_in_order() {
    let harness = TestHarness::with_fakes(FakeTools::all(3), FakeOcr::default());
    let path = harness.write_input("scan.pdf", &scanned_pdf(3));

    let text = harness.extractor(false).extract_text(&path).await.unwrap();

    assert_eq!(text, "OCR page-1\nOCR page-2\nOCR page-3\n");
    assert_eq!(harness.tools.calls(), vec!["qpdf", "pdftoppm"]);
    assert_eq!(harness.ocr.seen().len(), 3);
}

#[tokio::test]
async fn ghostscript_used_when_qpdf_missing() {
    let harness = TestHarness::with_fakes(FakeTools::with(&["gs", "pdftoppm"], 1), FakeOcr::default());
    let path = harness.write_input("scan.pdf", &scanned_pdf(1));

    let text = harness.extractor(false).extract_text(&path).await.unwrap();

    assert_eq!(text, "OCR page-1\n");
    assert_eq!(harness.tools.calls(), vec!["qpdf", "gs", "pdftoppm"]);
}

#[tokio::test]
async fn repair_failure_does_not_stop_ocr() {
    let harness = TestHarness::with_fakes(FakeTools::with(&["pdftoppm"], 2), FakeOcr::default());
    let path = harness.write_input("scan.pdf", &scanned_pdf(2));

    let text = harness.extractor(false).extract_text(&path).await.unwrap();

    assert_eq!(text, "OCR page-1\nOCR page-2\n");
    assert_eq!(harness.tools.calls(), vec!["qpdf", "gs", "pdftoppm"]);
}

#[tokio::test]
async fn missing_rasterizer_is_an_error_not_empty_text() {
    let harness = TestHarness::with_fakes(FakeTools::none(), FakeOcr::default());
    let path = harness.write_input("scan.pdf", &scanned_pdf(1));

    let err = harness
        .extractor(false)
        .extract_text(&path)
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "rasterizer_missing");
    assert!(err.to_string().contains("pdftoppm"));
    assert!(harness.ocr.seen().is_empty());
    assert!(harness.scratch_entries().is_empty());
}

#[tokio::test]
async fn scratch_space_removed_after_success_and_failure() {
    let harness = TestHarness::with_fakes(FakeTools::all(2), FakeOcr::default());
    let path = harness.write_input("scan.pdf", &scanned_pdf(2));
    harness.extractor(false).extract_text(&path).await.unwrap();

    assert!(harness.scratch_entries().is_empty());
    for dir in harness.tools.raster_dirs() {
        assert!(!dir.exists(), "{} left behind", dir.display());
    }

    let failing = TestHarness::with_fakes(FakeTools::all(2), FakeOcr::failing_on("page-2"));
    let path = failing.write_input("scan.pdf", &scanned_pdf(2));
    let err = failing
        .extractor(false)
        .extract_text(&path)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::OcrFailed { page: 2, .. }));
    assert_eq!(err.page(), Some(2));
    assert!(failing.scratch_entries().is_empty());
}

#[tokio::test]
async fn images_go_straight_to_ocr() {
    let harness = TestHarness::new();
    let path = harness.write_input("scan.png", b"png bytes");

    let text = harness.extractor(false).extract_text(&path).await.unwrap();

    assert_eq!(text, "OCR scan\n");
    assert!(harness.tools.calls().is_empty());
}

#[tokio::test]
async fn offline_mode_never_runs_tools() {
    let harness = TestHarness::with_fakes(FakeTools::none(), FakeOcr::default());
    let pdf = harness.write_input("scan.pdf", &scanned_pdf(1));
    let image = harness.write_input("scan.jpg", b"jpeg bytes");
    let extractor = harness.extractor(true);

    assert_eq!(extractor.extract_text(&pdf).await.unwrap(), MOCK_OCR_TEXT);
    assert_eq!(extractor.extract_text(&image).await.unwrap(), MOCK_OCR_TEXT);
    assert!(harness.tools.calls().is_empty());
    assert!(harness.ocr.seen().is_empty());
}

#[tokio::test]
async fn unreadable_and_unsupported_inputs() {
    let harness = TestHarness::new();
    let extractor = harness.extractor(false);

    let missing = harness.input_dir.join("gone.pdf");
    let err = extractor.extract_text(&missing).await.unwrap_err();
    assert_eq!(err.reason(), "source_unreadable");

    let doc = harness.write_input("notes.docx", b"PK");
    let err = extractor.extract_text(&doc).await.unwrap_err();
    assert_eq!(err.reason(), "unsupported_format");
}
