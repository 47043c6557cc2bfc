//! Plain-text extraction for the supported upload formats.
//!
//! Every extractor is synchronous and may be slow on large files; callers run it on the
//! blocking pool.

use crate::intake::extension_of;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::types::DocumentError;

/// Text pulled out of a document together with its page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtractedText {
    pub(crate) text: String,
    pub(crate) pages: usize,
}

/// Dispatch on the file extension and extract the document's text.
pub(crate) fn extract_text(path: &Path) -> Result<ExtractedText, DocumentError> {
    let name = display_name(path);
    match extension_of(&name).as_str() {
        "txt" => extract_plain(path),
        "pdf" => extract_pdf(path, &name),
        "docx" => extract_docx(path, &name),
        other => Err(DocumentError::UnsupportedFormat(if other.is_empty() {
            name
        } else {
            other.to_string()
        })),
    }
}

/// Final path component, used in messages and as the fragment source.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> DocumentError {
    DocumentError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn extract_plain(path: &Path) -> Result<ExtractedText, DocumentError> {
    let bytes = std::fs::read(path).map_err(|source| io_error(path, source))?;
    Ok(ExtractedText {
        text: String::from_utf8_lossy(&bytes).into_owned(),
        pages: 1,
    })
}

fn extract_pdf(path: &Path, name: &str) -> Result<ExtractedText, DocumentError> {
    let document = lopdf::Document::load(path).map_err(|err| DocumentError::Extraction {
        name: name.to_string(),
        reason: err.to_string(),
    })?;

    let pages = document.get_pages();
    let mut text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(page_text.trim_end());
                text.push_str("\n\n");
            }
            Err(err) => {
                tracing::warn!(
                    document = name,
                    page = page_number,
                    error = %err,
                    "Skipping page without extractable text"
                );
            }
        }
    }

    Ok(ExtractedText {
        text,
        pages: pages.len(),
    })
}

fn extract_docx(path: &Path, name: &str) -> Result<ExtractedText, DocumentError> {
    let extraction_error = |reason: String| DocumentError::Extraction {
        name: name.to_string(),
        reason,
    };

    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let mut archive = ZipArchive::new(file).map_err(|err| extraction_error(err.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| extraction_error(err.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|err| extraction_error(err.to_string()))?;

    docx_body_text(&xml).map_err(extraction_error)
}

/// Walk `word/document.xml`, keeping `w:t` runs and turning paragraphs, in-run tabs and line
/// breaks into whitespace. Explicit page breaks are counted to estimate pages.
fn docx_body_text(xml: &str) -> Result<ExtractedText, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_run = false;
    let mut in_run_text = false;
    let mut page_breaks = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_run_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            // `w:tab` outside a run is a tab-stop definition in paragraph properties.
            Ok(Event::Empty(e)) if in_run => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => {
                    if is_page_break(&e) {
                        page_breaks += 1;
                    }
                    text.push('\n');
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_run_text => {
                text.push_str(&e.decode().map_err(|err| err.to_string())?);
            }
            Ok(Event::GeneralRef(e)) if in_run_text => {
                match e.resolve_char_ref().map_err(|err| err.to_string())? {
                    Some(ch) => text.push(ch),
                    None => {
                        let name = e.decode().map_err(|err| err.to_string())?;
                        match resolve_predefined_entity(&name) {
                            Some(resolved) => text.push_str(resolved),
                            None => tracing::debug!(entity = %name, "Skipping unknown entity"),
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(err.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(ExtractedText {
        text,
        pages: page_breaks + 1,
    })
}

fn is_page_break(element: &BytesStart<'_>) -> bool {
    element
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"w:type" && attr.value.as_ref() == b"page")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Revenue</w:t></w:r><w:r><w:t xml:space="preserve"> rose 12%.</w:t></w:r></w:p>
    <w:p><w:r><w:br w:type="page"/><w:t>Costs</w:t><w:tab/><w:t>fell.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn write_docx(path: &Path, document_xml: &str) {
        let file = File::create(path).expect("create docx");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .expect("start entry");
        writer
            .write_all(document_xml.as_bytes())
            .expect("write entry");
        writer.finish().expect("finish docx");
    }

    #[test]
    fn plain_text_is_read_lossily() {
        let dir = tempfile::tempdir().expect("dir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"caf\xe9 ledger").expect("write");

        let extracted = extract_text(&path).expect("extracted");
        assert_eq!(extracted.pages, 1);
        assert!(extracted.text.starts_with("caf"));
        assert!(extracted.text.ends_with("ledger"));
    }

    #[test]
    fn docx_paragraphs_and_page_breaks_are_extracted() {
        let dir = tempfile::tempdir().expect("dir");
        let path = dir.path().join("memo.docx");
        write_docx(&path, DOCUMENT_XML);

        let extracted = extract_text(&path).expect("extracted");
        assert_eq!(extracted.text, "Revenue rose 12%.\n\nCosts\tfell.\n");
        assert_eq!(extracted.pages, 2);
    }

    #[test]
    fn invalid_docx_archive_is_an_extraction_error() {
        let dir = tempfile::tempdir().expect("dir");
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip archive").expect("write");

        let error = extract_text(&path).unwrap_err();
        assert!(matches!(error, DocumentError::Extraction { ref name, .. } if name == "broken.docx"));
    }

    #[test]
    fn corrupt_pdf_yields_no_text() {
        let dir = tempfile::tempdir().expect("dir");
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").expect("write");

        match extract_text(&path) {
            Err(DocumentError::Extraction { .. }) => {}
            Ok(extracted) => assert!(extracted.text.trim().is_empty()),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let error = extract_text(Path::new("/tmp/picture.png")).unwrap_err();
        assert!(matches!(error, DocumentError::UnsupportedFormat(ref ext) if ext == "png"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = extract_text(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(error, DocumentError::Io { .. }));
    }

    #[test]
    fn docx_entities_and_character_references_are_decoded() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>R&amp;D &lt;5%&gt; &#x41;&#8364; &quot;ok&apos;</w:t></w:r></w:p>
</w:body></w:document>"#;

        let extracted = docx_body_text(xml).expect("extracted");
        assert_eq!(extracted.text, "R&D <5%> A€ \"ok'\n");
    }

    #[test]
    fn tab_stop_definitions_do_not_emit_tabs() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/><w:tab w:val="right" w:pos="9360"/></w:tabs></w:pPr><w:r><w:t>Item</w:t><w:tab/><w:t>Amount</w:t></w:r></w:p>
</w:body></w:document>"#;

        let extracted = docx_body_text(xml).expect("extracted");
        assert_eq!(extracted.text, "Item\tAmount\n");
    }
}
