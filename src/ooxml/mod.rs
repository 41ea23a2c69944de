//! Minimal Office Open XML writers for the PDF-to-office operations.
//!
//! DOCX, PPTX and XLSX files are ZIP packages of XML parts. The three
//! outputs docforge produces are deliberately plain (paragraphs of text, one
//! picture per slide, one column of strings) so each writer only emits the
//! parts Word, PowerPoint, Excel and LibreOffice require to open the file.
//!
//! * [`docx`]: one paragraph per line
//! * [`pptx`]: one full-width picture per slide
//! * [`xlsx`]: one row per line in column A

pub mod docx;
pub mod pptx;
pub mod xlsx;

use crate::error::DocforgeError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const XML_HEADER: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

pub(crate) const RELS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-package.relationships+xml";

pub(crate) const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(crate) const NS_PACKAGE_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";

/// A ZIP package being written part by part.
pub(crate) struct Package {
    path: PathBuf,
    zip: ZipWriter<BufWriter<File>>,
    options: SimpleFileOptions,
}

impl Package {
    pub(crate) fn create(path: &Path) -> Result<Self, DocforgeError> {
        let file = File::create(path).map_err(|e| DocforgeError::storage(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            zip: ZipWriter::new(BufWriter::new(file)),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        })
    }

    pub(crate) fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), DocforgeError> {
        self.start(name)?;
        self.zip
            .write_all(bytes)
            .map_err(|e| DocforgeError::storage(&self.path, e))
    }

    /// Stream a file from disk into the package.
    pub(crate) fn add_file(&mut self, name: &str, source: &Path) -> Result<(), DocforgeError> {
        self.start(name)?;
        let mut input = File::open(source).map_err(|e| DocforgeError::storage(source, e))?;
        std::io::copy(&mut input, &mut self.zip)
            .map(|_| ())
            .map_err(|e| DocforgeError::storage(&self.path, e))
    }

    pub(crate) fn finish(self) -> Result<(), DocforgeError> {
        let path = self.path;
        let mut writer = self.zip.finish().map_err(|e| DocforgeError::ArchiveWrite {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        writer.flush().map_err(|e| DocforgeError::storage(&path, e))
    }

    fn start(&mut self, name: &str) -> Result<(), DocforgeError> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| DocforgeError::ArchiveWrite {
                path: self.path.clone(),
                detail: e.to_string(),
            })
    }
}

/// Escape text for an XML element or attribute value.
///
/// Characters XML 1.0 cannot carry at all (most C0 controls) are dropped;
/// PDF text extraction produces them for some embedded fonts.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            '\u{FFFE}' | '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

/// `[Content_Types].xml` with the usual `rels`/`xml` defaults plus `overrides`
/// as `(part name, content type)` pairs.
pub(crate) fn content_types(extra_defaults: &[(&str, &str)], overrides: &[(String, &str)]) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    xml.push_str(&format!(
        r#"<Default Extension="rels" ContentType="{RELS_CONTENT_TYPE}"/>"#
    ));
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    for (ext, ct) in extra_defaults {
        xml.push_str(&format!(r#"<Default Extension="{ext}" ContentType="{ct}"/>"#));
    }
    for (part, ct) in overrides {
        xml.push_str(&format!(r#"<Override PartName="{part}" ContentType="{ct}"/>"#));
    }
    xml.push_str("</Types>");
    xml
}

/// A relationships part from `(id, type suffix, target)` triples. The type
/// suffix is appended to the officeDocument relationships namespace.
pub(crate) fn relationships(rels: &[(String, &str, String)]) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!(r#"<Relationships xmlns="{NS_PACKAGE_RELATIONSHIPS}">"#));
    for (id, kind, target) in rels {
        xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{NS_RELATIONSHIPS}/{kind}" Target="{}"/>"#,
            escape(target)
        ));
    }
    xml.push_str("</Relationships>");
    xml
}
