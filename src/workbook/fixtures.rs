//! Builds small `.xlsx` files for tests.

use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A fixture cell.
#[derive(Debug, Clone)]
pub(crate) enum Cell {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Serial date rendered with a date number format.
    Date(f64),
    Empty,
}

impl Cell {
    pub fn s(text: &str) -> Self {
        Cell::Str(text.to_string())
    }

    pub fn n(value: f64) -> Self {
        Cell::Num(value)
    }

    pub fn b(value: bool) -> Self {
        Cell::Bool(value)
    }

    pub fn date(serial: f64) -> Self {
        Cell::Date(serial)
    }
}

enum SheetPart {
    Rows(Vec<Vec<Cell>>),
    /// Worksheet XML written as given.
    Raw(String),
    Missing,
}

#[derive(Default)]
pub(crate) struct XlsxBuilder {
    sheets: Vec<(String, SheetPart)>,
}

fn column_name(mut idx: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_name(c), r + 1);
            match cell {
                Cell::Str(s) => xml.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    reference,
                    escape(s)
                )),
                Cell::Num(n) => xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, n)),
                Cell::Bool(b) => xml.push_str(&format!(
                    r#"<c r="{}" t="b"><v>{}</v></c>"#,
                    reference,
                    if *b { 1 } else { 0 }
                )),
                Cell::Date(d) => {
                    xml.push_str(&format!(r#"<c r="{}" s="1"><v>{}</v></c>"#, reference, d))
                }
                Cell::Empty => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

impl XlsxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(mut self, name: &str, rows: Vec<Vec<Cell>>) -> Self {
        self.sheets.push((name.to_string(), SheetPart::Rows(rows)));
        self
    }

    /// A sheet whose `sheetData` body is the given row XML.
    pub fn raw_sheet(mut self, name: &str, rows_xml: &str) -> Self {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            rows_xml
        );
        self.sheets.push((name.to_string(), SheetPart::Raw(xml)));
        self
    }

    /// A sheet listed in the workbook whose part is missing from the archive.
    pub fn broken_sheet(mut self, name: &str) -> Self {
        self.sheets.push((name.to_string(), SheetPart::Missing));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buf));
            let mut workbook = String::from(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
            );
            let mut rels = String::from(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            );
            for (idx, (name, _)) in self.sheets.iter().enumerate() {
                workbook.push_str(&format!(
                    r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                    escape(name),
                    idx + 1,
                    idx + 1
                ));
                rels.push_str(&format!(
                    r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                    idx + 1,
                    idx + 1
                ));
            }
            workbook.push_str("</sheets></workbook>");
            rels.push_str("</Relationships>");

            zip.start_file("xl/workbook.xml", SimpleFileOptions::default()).unwrap();
            zip.write_all(workbook.as_bytes()).unwrap();
            zip.start_file("xl/_rels/workbook.xml.rels", SimpleFileOptions::default()).unwrap();
            zip.write_all(rels.as_bytes()).unwrap();
            zip.start_file("xl/styles.xml", SimpleFileOptions::default()).unwrap();
            zip.write_all(
                br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#,
            )
            .unwrap();

            for (idx, (_, part)) in self.sheets.iter().enumerate() {
                let xml = match part {
                    SheetPart::Rows(rows) => sheet_xml(rows),
                    SheetPart::Raw(xml) => xml.clone(),
                    SheetPart::Missing => continue,
                };
                zip.start_file(format!("xl/worksheets/sheet{}.xml", idx + 1), SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

#[test]
fn test_column_name() {
    assert_eq!(column_name(0), "A");
    assert_eq!(column_name(25), "Z");
    assert_eq!(column_name(26), "AA");
    assert_eq!(column_name(27), "AB");
}
