//! Comma-separated record codec shared by the ledger and the unknown log.
//!
//! Both files use the schema `Name,Timestamp,Confidence`. Fields holding a
//! comma, quote or line break are quoted with doubled inner quotes; the
//! reader accepts that plus `\r\n` line endings.

use chrono::NaiveDateTime;

pub const HEADER: [&str; 3] = ["Name", "Timestamp", "Confidence"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

pub fn format_confidence(confidence: f32) -> String {
    format!("{confidence:.2}")
}

pub fn parse_confidence(s: &str) -> Option<f32> {
    s.trim().parse::<f32>().ok().filter(|c| !c.is_nan())
}

/// A `[name, timestamp, confidence]` record ready for encoding.
pub fn entry(name: &str, timestamp: NaiveDateTime, confidence: f32) -> Vec<String> {
    vec![
        name.to_string(),
        format_timestamp(timestamp),
        format_confidence(confidence),
    ]
}

pub fn header() -> Vec<String> {
    HEADER.iter().map(|h| h.to_string()).collect()
}

/// Encode one record as a line, without the trailing newline.
pub fn encode_line<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| encode_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split file contents into records. Blank lines are skipped.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                pending = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                pending = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if pending {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                pending = false;
            }
            _ => {
                field.push(c);
                pending = true;
            }
        }
    }

    if pending {
        record.push(field);
        records.push(record);
    }

    records
}
