//! Import file parsing: JSON, CSV and spreadsheet workbooks to [`RawRow`]s.
//!
//! Every format ends up as the same shape, a map from header label to string,
//! so nothing downstream knows which file the rows came from.

use calamine::{open_workbook_auto_from_rs, Reader};
use serde::Serialize;
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;

use crate::error::{FileError, FileResult};
use crate::models::RawRow;

/// Source format of an import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Json,
    Csv,
    Workbook,
}

impl FileFormat {
    /// Pick the format from a file name extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "csv" | "txt" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Workbook),
            _ => None,
        }
    }

    /// Guess the format from content when no usable name is available.
    pub fn sniff(bytes: &[u8]) -> Self {
        // zip container (xlsx/ods) or OLE compound file (xls)
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            return Self::Workbook;
        }
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        match first {
            Some(b'[') => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Data rows in file order
    pub rows: Vec<RawRow>,
    /// Format the rows were read from
    pub format: FileFormat,
    /// Column headers as written in the file
    pub headers: Vec<String>,
    /// Detected text encoding (CSV only)
    pub encoding: Option<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Import templates are always comma separated.
pub const CSV_DELIMITER: u8 = b',';

/// Parse CSV text with an explicit delimiter.
///
/// The first record defines the headers. Blank records are skipped, short
/// records are padded with empty strings and extra cells are ignored.
pub fn parse_csv(content: &str, delimiter: u8) -> FileResult<(Vec<String>, Vec<RawRow>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(1, e))?
        .iter()
        .map(|h| h.trim_matches('"').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(FileError::Empty);
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(idx + 2, e))?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        let row: RawRow = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| {
                let value = record.get(i).unwrap_or("").trim_matches('"').to_string();
                (h.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok((headers, rows))
}

fn csv_error(fallback_line: usize, e: csv::Error) -> FileError {
    let line = e
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(fallback_line);
    FileError::Csv { line, message: e.to_string() }
}

/// Parse a JSON array of row objects.
///
/// Non-string cells are stringified so every value has the same type.
pub fn parse_json(content: &str) -> FileResult<(Vec<String>, Vec<RawRow>)> {
    let value: Value = serde_json::from_str(content).map_err(|e| FileError::Json(e.to_string()))?;
    let items = value
        .as_array()
        .ok_or_else(|| FileError::Json("expected an array of objects".to_string()))?;

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| FileError::Json(format!("element {} is not an object", i)))?;

        let mut row = RawRow::new();
        for (key, value) in obj {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
            row.insert(key.clone(), json_cell(value));
        }
        rows.push(row);
    }

    Ok((headers, rows))
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Parse the first sheet of a workbook (xlsx, xls, ods).
///
/// Row one holds the headers; fully empty rows are skipped.
pub fn parse_workbook(bytes: &[u8]) -> FileResult<(Vec<String>, Vec<RawRow>)> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| FileError::Workbook(e.to_string()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| FileError::Workbook("No sheets found".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| FileError::Workbook(e.to_string()))?;

    let mut cells = range.rows();
    let headers: Vec<String> = match cells.next() {
        Some(first) => first.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Err(FileError::Empty),
    };

    let mut rows = Vec::new();
    for line in cells {
        let values: Vec<String> = line.iter().map(|c| c.to_string().trim().to_string()).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.clone(), values.get(i).cloned().unwrap_or_default()))
            .collect();
        rows.push(row);
    }

    Ok((headers, rows))
}

/// Parse import bytes, using `file_name` to choose the format when it has a
/// known extension and sniffing the content otherwise.
pub fn parse_bytes(bytes: &[u8], file_name: Option<&str>) -> FileResult<ParseResult> {
    let format = file_name
        .and_then(FileFormat::from_file_name)
        .unwrap_or_else(|| FileFormat::sniff(bytes));

    let (headers, rows, encoding) = match format {
        FileFormat::Workbook => {
            let (h, r) = parse_workbook(bytes)?;
            (h, r, None)
        }
        FileFormat::Json => {
            let encoding = detect_encoding(bytes);
            let (h, r) = parse_json(&decode_content(bytes, &encoding))?;
            (h, r, Some(encoding))
        }
        FileFormat::Csv => {
            let encoding = detect_encoding(bytes);
            let content = decode_content(bytes, &encoding);
            let (h, r) = parse_csv(&content, CSV_DELIMITER)?;
            (h, r, Some(encoding))
        }
    };

    if rows.is_empty() {
        return Err(FileError::Empty);
    }

    Ok(ParseResult { rows, format, headers, encoding })
}

/// Parse an import file from disk.
pub fn parse_file<P: AsRef<Path>>(path: P) -> FileResult<ParseResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path.file_name().and_then(|n| n.to_str());
    parse_bytes(&bytes, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_simple_csv() {
        let csv = "Institution Code,Course Code\nJKKN,BCA101\nJKKN,BCA102";
        let (headers, rows) = parse_csv(csv, b',').unwrap();

        assert_eq!(headers, vec!["Institution Code", "Course Code"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Institution Code"], "JKKN");
        assert_eq!(rows[1]["Course Code"], "BCA102");
    }

    #[test]
    fn test_quoted_values_are_stripped() {
        let csv = "\"name\",\"value\"\n\"Alice\",\"Hello, World\"";
        let (_, rows) = parse_csv(csv, b',').unwrap();

        assert_eq!(rows[0]["name"], "Alice");
        assert_eq!(rows[0]["value"], "Hello, World");
    }

    #[test]
    fn test_blank_lines_skipped() {
        let csv = "a,b\n1,2\n\n,\n3,4\n";
        let (_, rows) = parse_csv(csv, b',').unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], "3");
    }

    #[test]
    fn test_short_and_long_records() {
        let csv = "a,b,c\n1\n1,2,3,4";
        let (_, rows) = parse_csv(csv, b',').unwrap();

        assert_eq!(rows[0]["b"], "");
        assert_eq!(rows[0]["c"], "");
        assert_eq!(rows[1]["c"], "3");
        assert_eq!(rows[1].len(), 3);
    }

    #[test]
    fn test_csv_is_comma_separated() {
        let result = parse_bytes(b"Course Code;Session Code\nBCA101;NOV25\n", Some("rows.csv")).unwrap();
        assert_eq!(result.headers, vec!["Course Code;Session Code"]);
        assert_eq!(result.rows[0]["Course Code;Session Code"], "BCA101;NOV25");
    }

    #[test]
    fn test_json_rows_stringified() {
        let json = r#"[{"course_code": "BCA101", "max_enrollment": 60, "is_active": true, "remarks": null}]"#;
        let (headers, rows) = parse_json(json).unwrap();

        assert_eq!(headers.len(), 4);
        assert_eq!(rows[0]["max_enrollment"], "60");
        assert_eq!(rows[0]["is_active"], "true");
        assert_eq!(rows[0]["remarks"], "");
    }

    #[test]
    fn test_json_must_be_array_of_objects() {
        assert!(matches!(parse_json(r#"{"a": 1}"#), Err(FileError::Json(_))));
        assert!(matches!(parse_json("[1, 2]"), Err(FileError::Json(_))));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let result = parse_bytes(b"a,b\n", Some("rows.csv"));
        assert!(matches!(result, Err(FileError::Empty)));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_file_name("x.XLSX"), Some(FileFormat::Workbook));
        assert_eq!(FileFormat::from_file_name("x.json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_file_name("x.pdf"), None);
        assert_eq!(FileFormat::sniff(b"  [ {} ]"), FileFormat::Json);
        assert_eq!(FileFormat::sniff(b"PK\x03\x04rest"), FileFormat::Workbook);
        assert_eq!(FileFormat::sniff(b"a,b"), FileFormat::Csv);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_parse_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Institution Code *,Course Code *").unwrap();
        writeln!(file, "JKKN,BCA101").unwrap();

        let result = parse_file(file.path()).unwrap();
        assert_eq!(result.format, FileFormat::Csv);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["Course Code *"], "BCA101");
    }
}
