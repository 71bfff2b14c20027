use anyhow::{anyhow, Result};
use lopdf::{dictionary, Document, Object, StringFormat};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::assembler::AssembledDocument;
use crate::config::PageOptions;

/// Paginates an assembled document into a single file at `output`.
#[allow(async_fn_in_trait)]
pub trait ArtifactEmitter {
    async fn emit(
        &mut self,
        document: &AssembledDocument,
        output: &Path,
        options: &PageOptions,
    ) -> Result<()>;
}

const PRODUCER: &str = concat!("docbind ", env!("CARGO_PKG_VERSION"));

/// Stamps `Title` and `Producer` into the PDF's Info dictionary and returns
/// its page count.
pub async fn finalize_artifact(path: &Path, title: &str) -> Result<usize> {
    let data = fs::read(path)
        .await
        .map_err(|e| anyhow!("Failed to read PDF file {}: {}", path.display(), e))?;

    let mut document = Document::load_mem(&data)
        .map_err(|e| anyhow!("Failed to parse PDF file {}: {}", path.display(), e))?;

    let page_count = document.get_pages().len();
    debug!("Loaded PDF with {} pages from {}", page_count, path.display());

    let existing_info = document
        .trailer
        .get(b"Info")
        .and_then(Object::as_reference)
        .ok();

    let mut stamped = false;
    if let Some(info_id) = existing_info {
        if let Ok(Object::Dictionary(info)) = document.get_object_mut(info_id) {
            info.set("Title", pdf_text(title));
            info.set("Producer", pdf_text(PRODUCER));
            stamped = true;
        }
    }

    if !stamped {
        let info_id = document.add_object(dictionary! {
            "Title" => pdf_text(title),
            "Producer" => pdf_text(PRODUCER),
        });
        document.trailer.set("Info", Object::Reference(info_id));
    }

    let mut out = Vec::new();
    document
        .save_to(&mut out)
        .map_err(|e| anyhow!("Failed to serialize PDF: {}", e))?;

    fs::write(path, out)
        .await
        .map_err(|e| anyhow!("Failed to write PDF to {}: {}", path.display(), e))?;

    info!("Finalized {} ({} pages)", path.display(), page_count);
    Ok(page_count)
}

/// PDF text string: literal for ASCII, UTF-16BE with a byte order mark
/// otherwise.
fn pdf_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_page_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn stamps_title_and_counts_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, one_page_pdf()).unwrap();

        let pages = finalize_artifact(&path, "Handbook").await.unwrap();
        assert_eq!(pages, 1);

        let doc = Document::load(&path).unwrap();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_object(info_id).unwrap().as_dict().unwrap();
        assert_eq!(info.get(b"Title").unwrap().as_str().unwrap(), b"Handbook");
    }

    #[tokio::test]
    async fn rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        assert!(finalize_artifact(&path, "x").await.is_err());
    }

    #[test]
    fn unicode_titles_are_utf16() {
        match pdf_text("Größe") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(bytes.len(), 2 + 5 * 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
