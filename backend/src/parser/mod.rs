//! Raw table representation and CSV extraction helpers.
//!
//! A [`RawTable`] is the input interface of the pipeline: a list of rows,
//! each a JSON object from column name to scalar value. Extraction itself is
//! an external concern; the CSV helpers here exist so the CLI and tests can
//! build raw tables from STATS19 extract files.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::Dataset;

/// Matches runs of characters that are not allowed in a normalised column name.
static NON_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex is valid"));

/// Values treated as "no value" in addition to empty cells.
const MISSING_MARKERS: [&str; 3] = ["null", "na", "nan"];

/// STATS19 "data missing or out of range" code.
const SENTINEL: i64 = -1;

// =============================================================================
// Raw table
// =============================================================================

/// One raw source table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub dataset: Dataset,
    /// Normalised column names, in file order.
    pub headers: Vec<String>,
    /// One JSON object per source row; row index is the position in this vector.
    pub rows: Vec<Map<String, Value>>,
}

impl RawTable {
    pub fn new(dataset: Dataset, headers: Vec<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            dataset,
            headers,
            rows,
        }
    }

    /// Build a table from JSON objects, taking the header from the union of keys.
    ///
    /// Non-object values are kept as empty rows so row indices stay aligned.
    pub fn from_json_rows(dataset: Dataset, rows: Vec<Value>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(rows.len());

        for row in rows {
            let obj = match row {
                Value::Object(map) => map
                    .into_iter()
                    .map(|(k, v)| (normalize_header(&k), v))
                    .collect::<Map<String, Value>>(),
                _ => Map::new(),
            };
            for key in obj.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
            objects.push(obj);
        }

        Self::new(dataset, headers, objects)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }
}

// =============================================================================
// Cell helpers
// =============================================================================

/// Check whether a cell carries no usable value.
///
/// Absent, null, blank, the STATS19 `-1` sentinel and common NA markers all
/// count as missing.
pub fn is_missing(value: Option<&Value>) -> bool {
    is_blank(value) || is_sentinel(value)
}

/// Missing without the `-1` sentinel, for measured values such as
/// coordinates where `-1` is a real reading.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => {
            let t = s.trim();
            t.is_empty() || MISSING_MARKERS.iter().any(|m| t.eq_ignore_ascii_case(m))
        }
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(Value::Number(_)) | Some(Value::Bool(_)) => false,
    }
}

fn is_sentinel(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_i64() == Some(SENTINEL),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok() == Some(SENTINEL),
        _ => false,
    }
}

/// Trimmed textual form of a present cell.
pub fn cell_text(value: Option<&Value>) -> Option<String> {
    if is_missing(value) {
        return None;
    }
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// Outcome of reading a numeric cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericCell {
    Missing,
    Number(f64),
    /// Present but not a number.
    Invalid,
}

/// Read a cell as a finite floating-point number. `-1` reads as missing.
pub fn numeric_cell(value: Option<&Value>) -> NumericCell {
    if is_sentinel(value) {
        return NumericCell::Missing;
    }
    plain_numeric_cell(value)
}

/// Read a cell as a finite floating-point number, keeping `-1`.
pub fn plain_numeric_cell(value: Option<&Value>) -> NumericCell {
    if is_blank(value) {
        return NumericCell::Missing;
    }
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => NumericCell::Number(v),
        _ => NumericCell::Invalid,
    }
}

/// Read a cell as an integer code. Decimal strings like `"3.0"` are accepted.
pub fn integer_cell(value: Option<&Value>) -> NumericCell {
    match numeric_cell(value) {
        NumericCell::Number(v) if v.fract() == 0.0 => NumericCell::Number(v),
        NumericCell::Number(_) => NumericCell::Invalid,
        other => other,
    }
}

// =============================================================================
// Header normalisation
// =============================================================================

/// Lowercase a header and collapse non-alphanumeric runs into `_`.
///
/// `"Accident Index"` and `"accident-index"` both become `"accident_index"`.
pub fn normalize_header(raw: &str) -> String {
    let lower = raw.trim_start_matches('\u{feff}').trim().to_lowercase();
    NON_IDENT.replace_all(&lower, "_").trim_matches('_').to_string()
}

// =============================================================================
// Encoding and delimiter detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
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

/// Decode bytes to a string using the given encoding, falling back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.bytes().filter(|b| *b == sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// CSV parsing
// =============================================================================

/// Parse CSV text with an explicit delimiter into a raw table.
///
/// Every cell is kept as a JSON string; typing happens in the Cleaner.
/// Short rows are padded with empty strings, extra cells are ignored.
pub fn parse_csv_str(content: &str, delimiter: u8, dataset: Dataset) -> CsvResult<RawTable> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::Parse {
            line: 1,
            message: e.to_string(),
        })?
        .iter()
        .map(normalize_header)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| CsvError::Parse {
            line: idx + 2,
            message: e.to_string(),
        })?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let mut obj = Map::new();
        for (i, header) in headers.iter().enumerate() {
            let raw_value = record.get(i).unwrap_or("");
            obj.insert(header.clone(), Value::String(raw_value.to_string()));
        }
        rows.push(obj);
    }

    Ok(RawTable::new(dataset, headers, rows))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8], dataset: Dataset) -> CsvResult<RawTable> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    parse_csv_str(&content, delimiter, dataset)
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P, dataset: Dataset) -> CsvResult<RawTable> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_csv() {
        let csv = "collision_index,age_of_driver\nA1,30\nA2,25";
        let table = parse_csv_str(csv, b',', Dataset::Vehicles).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.headers, vec!["collision_index", "age_of_driver"]);
        assert_eq!(table.rows[0]["collision_index"], "A1");
        assert_eq!(table.rows[1]["age_of_driver"], "25");
    }

    #[test]
    fn test_quoted_values_with_delimiter() {
        let csv = "a;b\n\"x;y\";2";
        let table = parse_csv_str(csv, b';', Dataset::Collisions).unwrap();
        assert_eq!(table.rows[0]["a"], "x;y");
        assert_eq!(table.rows[0]["b"], "2");
    }

    #[test]
    fn test_short_rows_padded_and_blank_lines_skipped() {
        let csv = "a,b,c\n1,,3\n,,\n4";
        let table = parse_csv_str(csv, b',', Dataset::Collisions).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["b"], "");
        assert_eq!(table.rows[1]["c"], "");
    }

    #[test]
    fn test_empty_csv_error() {
        let result = parse_csv_str("  ", b',', Dataset::Collisions);
        assert!(matches!(result, Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Accident Index"), "accident_index");
        assert_eq!(normalize_header("\u{feff}Engine-Capacity (CC)"), "engine_capacity_cc");
        assert_eq!(normalize_header("  speed_limit "), "speed_limit");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a|b|c"), b'|');
    }

    #[test]
    fn test_auto_parse() {
        let csv = "Collision_Index;Speed_Limit\nA1;30\nA2;-1";
        let table = parse_bytes_auto(csv.as_bytes(), Dataset::Collisions).unwrap();
        assert_eq!(table.headers, vec!["collision_index", "speed_limit"]);
        assert!(is_missing(table.rows[1].get("speed_limit")));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert!(decoded.contains("Soci"));
    }

    #[test]
    fn test_missing_markers() {
        assert!(is_missing(None));
        assert!(is_missing(Some(&json!(null))));
        assert!(is_missing(Some(&json!("  "))));
        assert!(is_missing(Some(&json!("-1"))));
        assert!(is_missing(Some(&json!(-1))));
        assert!(is_missing(Some(&json!("NULL"))));
        assert!(!is_missing(Some(&json!("0"))));
        assert!(!is_missing(Some(&json!(17))));
    }

    #[test]
    fn test_plain_numeric_keeps_minus_one() {
        assert!(!is_blank(Some(&json!("-1"))));
        assert_eq!(numeric_cell(Some(&json!("-1"))), NumericCell::Missing);
        assert_eq!(plain_numeric_cell(Some(&json!("-1"))), NumericCell::Number(-1.0));
        assert_eq!(plain_numeric_cell(Some(&json!(-1))), NumericCell::Number(-1.0));
        assert_eq!(plain_numeric_cell(Some(&json!("NA"))), NumericCell::Missing);
    }

    #[test]
    fn test_numeric_cells() {
        assert_eq!(numeric_cell(Some(&json!("1598"))), NumericCell::Number(1598.0));
        assert_eq!(numeric_cell(Some(&json!(51.5))), NumericCell::Number(51.5));
        assert_eq!(numeric_cell(Some(&json!("abc"))), NumericCell::Invalid);
        assert_eq!(numeric_cell(Some(&json!(""))), NumericCell::Missing);
        assert_eq!(integer_cell(Some(&json!("3.0"))), NumericCell::Number(3.0));
        assert_eq!(integer_cell(Some(&json!("3.5"))), NumericCell::Invalid);
    }

    #[test]
    fn test_from_json_rows_collects_headers() {
        let table = RawTable::from_json_rows(
            Dataset::Casualties,
            vec![json!({"Collision Index": "A1"}), json!({"age_of_casualty": 40})],
        );
        assert_eq!(table.headers, vec!["collision_index", "age_of_casualty"]);
        assert!(table.has_column("age_of_casualty"));
        assert_eq!(table.len(), 2);
    }
}
