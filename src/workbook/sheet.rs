//! Streaming parser for a worksheet part.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::parts::attr;
use super::styles::{serial_to_iso, DateStyles};
use crate::error::{Result, SheetIndexError};
use crate::value::CellValue;

/// Workbook-wide lookups needed to turn raw cells into values.
pub(super) struct CellContext<'a> {
    pub shared_strings: &'a [String],
    pub date_styles: &'a DateStyles,
    pub date1904: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CellKind {
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Boolean,
    Error,
    IsoDate,
}

impl CellKind {
    fn from_attr(t: Option<&str>) -> Self {
        match t {
            Some("s") => CellKind::SharedString,
            Some("inlineStr") => CellKind::InlineString,
            Some("str") => CellKind::FormulaString,
            Some("b") => CellKind::Boolean,
            Some("e") => CellKind::Error,
            Some("d") => CellKind::IsoDate,
            _ => CellKind::Number,
        }
    }
}

/// The cell currently being read.
struct OpenCell {
    column: usize,
    kind: CellKind,
    style: usize,
    value: String,
    inline: String,
}

#[derive(Clone, Copy, PartialEq)]
enum TextTarget {
    None,
    Value,
    Inline,
}

/// Last zero-based column a worksheet may use (`XFD`).
const MAX_COLUMN: usize = 16_383;

/// Zero-based column index of a cell reference such as `AB12`. `Ok(None)`
/// when the reference carries no column letters.
fn column_index(reference: &str) -> Result<Option<usize>> {
    let letters = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if letters == 0 {
        return Ok(None);
    }
    let out_of_range =
        || SheetIndexError::Workbook(format!("cell reference '{}' is beyond column XFD", reference));
    if letters > 3 {
        return Err(out_of_range());
    }
    let idx = reference.bytes().take(letters).fold(0usize, |idx, b| {
        idx * 26 + (b.to_ascii_uppercase() - b'A') as usize + 1
    }) - 1;
    if idx > MAX_COLUMN {
        return Err(out_of_range());
    }
    Ok(Some(idx))
}

fn open_cell(e: &BytesStart<'_>, next_column: usize) -> Result<OpenCell> {
    let column = match attr(e, b"r") {
        Some(reference) => column_index(&reference)?.unwrap_or(next_column),
        None => next_column,
    };
    if column > MAX_COLUMN {
        return Err(SheetIndexError::Workbook(format!(
            "row runs past column XFD ({} cells)",
            column + 1
        )));
    }
    Ok(OpenCell {
        column,
        kind: CellKind::from_attr(attr(e, b"t").as_deref()),
        style: attr(e, b"s").and_then(|s| s.parse().ok()).unwrap_or(0),
        value: String::new(),
        inline: String::new(),
    })
}

/// Normalize one cell. Anything that cannot be interpreted falls back to its
/// raw text with a warning.
fn cell_value(cell: &OpenCell, ctx: &CellContext<'_>) -> CellValue {
    let raw = cell.value.as_str();
    match cell.kind {
        CellKind::InlineString => CellValue::Text(cell.inline.clone()),
        CellKind::FormulaString | CellKind::Error | CellKind::IsoDate => {
            CellValue::Text(raw.to_string())
        }
        CellKind::SharedString => {
            match raw.trim().parse::<usize>().ok().and_then(|i| ctx.shared_strings.get(i)) {
                Some(s) => CellValue::Text(s.clone()),
                None => {
                    log::warn!("Shared string index '{}' out of range; keeping raw text", raw);
                    CellValue::Text(raw.to_string())
                }
            }
        }
        CellKind::Boolean => match raw.trim() {
            "1" | "true" | "TRUE" => CellValue::Bool(true),
            "0" | "false" | "FALSE" => CellValue::Bool(false),
            other => {
                log::warn!("Unrecognized boolean cell '{}'; keeping raw text", other);
                CellValue::Text(other.to_string())
            }
        },
        CellKind::Number => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return CellValue::Null;
            }
            match trimmed.parse::<f64>() {
                Ok(n) if ctx.date_styles.is_date(cell.style) => {
                    match serial_to_iso(n, ctx.date1904) {
                        Some(iso) => CellValue::Text(iso),
                        None => CellValue::from_number(n),
                    }
                }
                Ok(n) => CellValue::from_number(n),
                Err(_) => {
                    log::warn!("Unparseable numeric cell '{}'; keeping raw text", trimmed);
                    CellValue::Text(trimmed.to_string())
                }
            }
        }
    }
}

/// Parse rows in document order, skipping rows with no values, and stop once
/// `limit` rows have been collected. Each row is dense from column A to its
/// last value, with `Null` in the gaps.
pub(super) fn parse_rows<R: BufRead>(
    source: R,
    ctx: &CellContext<'_>,
    limit: usize,
) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<CellValue>> = Vec::new();

    let mut row: Vec<(usize, CellValue)> = Vec::new();
    let mut next_column = 0usize;
    let mut cell: Option<OpenCell> = None;
    let mut target = TextTarget::None;
    let mut in_phonetic = false;

    if limit == 0 {
        return Ok(rows);
    }

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SheetIndexError::Workbook(format!("malformed worksheet: {}", e)))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row.clear();
                    next_column = 0;
                }
                b"c" => cell = Some(open_cell(&e, next_column)?),
                b"v" if cell.is_some() => target = TextTarget::Value,
                b"rPh" => in_phonetic = true,
                b"t" if cell.is_some() && !in_phonetic => target = TextTarget::Inline,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_column = open_cell(&e, next_column)?.column + 1;
            }
            Event::Text(t) if target != TextTarget::None => {
                let text = t
                    .unescape()
                    .map_err(|e| SheetIndexError::Workbook(format!("malformed worksheet: {}", e)))?;
                if let Some(open) = cell.as_mut() {
                    match target {
                        TextTarget::Value => open.value.push_str(&text),
                        TextTarget::Inline => open.inline.push_str(&text),
                        TextTarget::None => {}
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => target = TextTarget::None,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let Some(open) = cell.take() {
                        next_column = open.column + 1;
                        let value = cell_value(&open, ctx);
                        if !value.is_null() {
                            row.push((open.column, value));
                        }
                    }
                }
                b"row" => {
                    if let Some(last) = row.iter().map(|(col, _)| *col).max() {
                        let mut dense = vec![CellValue::Null; last + 1];
                        for (col, value) in row.drain(..) {
                            dense[col] = value;
                        }
                        rows.push(dense);
                        if rows.len() >= limit {
                            break;
                        }
                    }
                }
                b"sheetData" => break,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str, strings: &[String], styles: &DateStyles, limit: usize) -> Vec<Vec<CellValue>> {
        let ctx = CellContext {
            shared_strings: strings,
            date_styles: styles,
            date1904: false,
        };
        parse_rows(xml.as_bytes(), &ctx, limit).unwrap()
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("Z9").unwrap(), Some(25));
        assert_eq!(column_index("AA3").unwrap(), Some(26));
        assert_eq!(column_index("ab100").unwrap(), Some(27));
        assert_eq!(column_index("XFD1").unwrap(), Some(MAX_COLUMN));
        assert_eq!(column_index("12").unwrap(), None);
    }

    #[test]
    fn test_column_index_rejects_references_past_xfd() {
        assert!(matches!(column_index("XFE1"), Err(SheetIndexError::Workbook(_))));
        assert!(matches!(column_index("ZZZZ1"), Err(SheetIndexError::Workbook(_))));
        assert!(matches!(
            column_index("AAAAAAAAAAAAAAAAAAAAAAAA1"),
            Err(SheetIndexError::Workbook(_))
        ));
    }

    #[test]
    fn test_parse_rows_fails_on_out_of_range_reference() {
        let ctx_styles = DateStyles::default();
        let ctx = CellContext {
            shared_strings: &[],
            date_styles: &ctx_styles,
            date1904: false,
        };
        for reference in ["AAAAAAAAAAAAAAAAAAAAAAAA1", "ZZZZ1"] {
            let xml = format!(
                r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c><c r="{}" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#,
                reference
            );
            let result = parse_rows(xml.as_bytes(), &ctx, 10);
            assert!(matches!(result, Err(SheetIndexError::Workbook(_))), "{}", reference);
        }

        let empty_cell = r#"<worksheet><sheetData><row r="1"><c r="ZZZZ1"/></row></sheetData></worksheet>"#;
        assert!(parse_rows(empty_cell.as_bytes(), &ctx, 10).is_err());
    }

    #[test]
    fn test_parse_rows_cell_kinds_and_gaps() {
        let strings = vec!["Submarket".to_string(), "Midtown".to_string()];
        let xml = r#"<worksheet><sheetData>
  <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>Occupied</t></is></c></row>
  <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" s="0"/><c r="C2" t="b"><v>1</v></c></row>
  <row r="3"/>
  <row r="4"><c r="B4"><v>12.5</v></c><c r="C4" t="e"><v>#DIV/0!</v></c></row>
  <row r="5"><c r="A5" t="str"><f>A1</f><v>Submarket</v></c></row>
</sheetData></worksheet>"#;
        let rows = parse(xml, &strings, &DateStyles::default(), 100);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            vec![CellValue::text("Submarket"), CellValue::Null, CellValue::text("Occupied")]
        );
        assert_eq!(
            rows[1],
            vec![CellValue::text("Midtown"), CellValue::Null, CellValue::Bool(true)]
        );
        assert_eq!(
            rows[2],
            vec![CellValue::Null, CellValue::Float(12.5), CellValue::text("#DIV/0!")]
        );
        assert_eq!(rows[3], vec![CellValue::text("Submarket")]);
    }

    #[test]
    fn test_parse_rows_stops_at_limit() {
        let mut xml = String::from("<worksheet><sheetData>");
        for i in 1..=50 {
            xml.push_str(&format!(r#"<row r="{i}"><c r="A{i}"><v>{i}</v></c></row>"#));
        }
        xml.push_str("</sheetData></worksheet>");
        let rows = parse(&xml, &[], &DateStyles::default(), 7);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[6], vec![CellValue::Int(7)]);
    }

    #[test]
    fn test_bad_values_fall_back_to_text() {
        let xml = r#"<worksheet><sheetData>
  <row><c t="s"><v>9</v></c><c><v>n/a</v></c><c t="b"><v>maybe</v></c></row>
</sheetData></worksheet>"#;
        let rows = parse(xml, &[], &DateStyles::default(), 10);
        assert_eq!(
            rows[0],
            vec![CellValue::text("9"), CellValue::text("n/a"), CellValue::text("maybe")]
        );
    }

    #[test]
    fn test_cells_without_reference_use_running_column() {
        let xml = r#"<worksheet><sheetData>
  <row><c t="inlineStr"><is><t>a</t></is></c><c t="inlineStr"><is><t>b</t></is></c></row>
</sheetData></worksheet>"#;
        let rows = parse(xml, &[], &DateStyles::default(), 10);
        assert_eq!(rows[0], vec![CellValue::text("a"), CellValue::text("b")]);
    }
}
