//! Date detection from cell number formats, and serial date conversion.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use super::parts::attr;
use crate::error::{Result, SheetIndexError};

/// Which cell style indices (`s` attribute) carry a date/time number format.
#[derive(Debug, Default)]
pub(super) struct DateStyles {
    is_date: Vec<bool>,
}

impl DateStyles {
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut custom: HashMap<u32, String> = HashMap::new();
        let mut xf_formats: Vec<u32> = Vec::new();
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"numFmt" => {
                        let id = attr(&e, b"numFmtId").and_then(|v| v.parse().ok());
                        if let (Some(id), Some(code)) = (id, attr(&e, b"formatCode")) {
                            custom.insert(id, code);
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        let id = attr(&e, b"numFmtId")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        xf_formats.push(id);
                    }
                    _ => {}
                },
                Ok(Event::End(e)) if e.local_name().as_ref() == b"cellXfs" => {
                    in_cell_xfs = false;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SheetIndexError::Workbook(format!(
                        "malformed xl/styles.xml: {}",
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        let is_date = xf_formats
            .into_iter()
            .map(|id| match custom.get(&id) {
                Some(code) => is_date_format_code(code),
                None => is_builtin_date_format(id),
            })
            .collect();
        Ok(Self { is_date })
    }

    pub fn is_date(&self, style: usize) -> bool {
        self.is_date.get(style).copied().unwrap_or(false)
    }
}

fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// A custom format is a date format when, outside quoted literals, escapes
/// and bracketed colour/locale tags, it uses a date or time token.
fn is_date_format_code(code: &str) -> bool {
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut tag = String::new();
                for q in chars.by_ref() {
                    if q == ']' {
                        break;
                    }
                    tag.push(q);
                }
                // Elapsed-time tags such as [h] or [mm] are time formats.
                let tag = tag.to_ascii_lowercase();
                if !tag.is_empty() && tag.chars().all(|t| matches!(t, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}

/// Convert a spreadsheet serial date to `YYYY-MM-DDTHH:MM:SS` (milliseconds
/// appended only when present). `None` for serials outside the calendar.
pub fn serial_to_iso(serial: f64, date1904: bool) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if serial < 61.0 {
        // Serials before the phantom 1900-02-29 count from 1899-12-31.
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let base: NaiveDateTime = epoch.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round();
    if millis > i64::MAX as f64 {
        return None;
    }
    let dt = base.checked_add_signed(TimeDelta::try_milliseconds(millis as i64)?)?;
    let formatted = if dt.and_utc().timestamp_subsec_millis() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    };
    Some(formatted)
}
