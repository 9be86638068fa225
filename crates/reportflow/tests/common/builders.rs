//! Builds small PDFs in memory for extraction tests.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};

/// A PDF with one page per entry; `None` pages have no text layer, like a
/// scanned page.
pub fn pdf_with_pages(page_texts: &[Option<&str>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in page_texts {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
        };
        if let Some(text) = text {
            let content = format!("BT /F1 11 Tf 72 720 Td ({}) Tj ET", text);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page.set("Contents", content_id);
        }
        kids.push(Object::from(doc.add_object(page)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn digital_pdf(text: &str) -> Vec<u8> {
    pdf_with_pages(&[Some(text)])
}

pub fn scanned_pdf(pages: usize) -> Vec<u8> {
    pdf_with_pages(&vec![None; pages])
}
