//! Best-effort PDF text extraction.

use anyhow::Context;
use lopdf::Document;

/// Concatenate the extractable text of every page in document order.
///
/// Individual pages that fail to decode are skipped; a document that
/// fails to load at all is an error (the dispatcher falls back to the
/// display name).
pub fn extract_text(bytes: &[u8]) -> anyhow::Result<String> {
    let doc = Document::load_mem(bytes).context("pdf parse")?;

    let mut out = String::new();
    for (page_no, _) in doc.get_pages() {
        match doc.extract_text(&[page_no]) {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
            Err(err) => log::debug!("skipping undecodable pdf page {page_no}: {err}"),
        }
    }

    Ok(out)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a minimal single-page PDF containing `text`.
    pub fn pdf_with_text(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn extracts_page_text() {
        let bytes = pdf_with_text("Invoice #42");
        let text = extract_text(&bytes).unwrap();
        assert!(text.contains("Invoice #42"), "got: {text:?}");
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        assert!(extract_text(b"definitely not a pdf").is_err());
    }
}
