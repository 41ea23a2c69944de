//! DOCX writer: plain paragraphs, no styling.

use super::{content_types, escape, relationships, Package, XML_HEADER};
use crate::error::DocforgeError;
use std::path::Path;

const DOCUMENT_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

/// US Letter with one-inch margins, in twentieths of a point.
const SECTION_PROPERTIES: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr>"#;

/// Write a document with one paragraph per entry of `lines`, in order.
///
/// An empty slice produces a valid document with an empty body.
pub fn write_paragraphs<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<(), DocforgeError> {
    let mut package = Package::create(path)?;
    package.add(
        "[Content_Types].xml",
        content_types(&[], &[("/word/document.xml".to_string(), DOCUMENT_CONTENT_TYPE)]).as_bytes(),
    )?;
    package.add(
        "_rels/.rels",
        relationships(&[(
            "rId1".to_string(),
            "officeDocument",
            "word/document.xml".to_string(),
        )])
        .as_bytes(),
    )?;
    package.add("word/document.xml", document_xml(lines).as_bytes())?;
    package.finish()
}

fn document_xml<S: AsRef<str>>(lines: &[S]) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    );
    for line in lines {
        let line = line.as_ref();
        if line.is_empty() {
            xml.push_str("<w:p/>");
        } else {
            xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
            xml.push_str(&escape(line));
            xml.push_str("</w:t></w:r></w:p>");
        }
    }
    xml.push_str(SECTION_PROPERTIES);
    xml.push_str("</w:body></w:document>");
    xml
}
