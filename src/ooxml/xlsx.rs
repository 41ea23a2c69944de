//! XLSX writer: one sheet, one column of inline strings.

use super::{content_types, escape, relationships, Package, XML_HEADER};
use crate::error::DocforgeError;
use std::path::Path;

const WORKBOOK_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Excel refuses cells longer than this many characters.
const MAX_CELL_CHARS: usize = 32_767;

/// Write `rows` into column A of a single sheet called `sheet_name`,
/// starting at row 1. Empty strings leave their row empty.
pub fn write_column<S: AsRef<str>>(
    path: &Path,
    sheet_name: &str,
    rows: &[S],
) -> Result<(), DocforgeError> {
    let mut package = Package::create(path)?;
    package.add(
        "[Content_Types].xml",
        content_types(
            &[],
            &[
                ("/xl/workbook.xml".to_string(), WORKBOOK_CONTENT_TYPE),
                ("/xl/worksheets/sheet1.xml".to_string(), WORKSHEET_CONTENT_TYPE),
            ],
        )
        .as_bytes(),
    )?;
    package.add(
        "_rels/.rels",
        relationships(&[(
            "rId1".to_string(),
            "officeDocument",
            "xl/workbook.xml".to_string(),
        )])
        .as_bytes(),
    )?;
    package.add("xl/workbook.xml", workbook_xml(sheet_name).as_bytes())?;
    package.add(
        "xl/_rels/workbook.xml.rels",
        relationships(&[(
            "rId1".to_string(),
            "worksheet",
            "worksheets/sheet1.xml".to_string(),
        )])
        .as_bytes(),
    )?;
    package.add("xl/worksheets/sheet1.xml", sheet_xml(rows).as_bytes())?;
    package.finish()
}

fn workbook_xml(sheet_name: &str) -> String {
    // Sheet names are capped at 31 characters.
    let name: String = sheet_name.chars().take(31).collect();
    format!(
        r#"{XML_HEADER}<workbook xmlns="{NS_MAIN}" xmlns:r="{}"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        super::NS_RELATIONSHIPS,
        escape(&name)
    )
}

fn sheet_xml<S: AsRef<str>>(rows: &[S]) -> String {
    let mut xml = format!(r#"{XML_HEADER}<worksheet xmlns="{NS_MAIN}"><sheetData>"#);
    for (i, row) in rows.iter().enumerate() {
        let r = i + 1;
        let text = row.as_ref();
        if text.is_empty() {
            xml.push_str(&format!(r#"<row r="{r}"/>"#));
            continue;
        }
        let text: String = text.chars().take(MAX_CELL_CHARS).collect();
        xml.push_str(&format!(
            r#"<row r="{r}"><c r="A{r}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c></row>"#,
            escape(&text)
        ));
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}
