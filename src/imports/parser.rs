use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io::Read;
use tracing::info;

/// Columns a placement file may carry. Anything outside this set is ignored.
pub const EXPECTED_HEADERS: [&str; 9] = [
    "external_ref",
    "debtor_name",
    "debtor_ssn_last4",
    "debtor_email",
    "debtor_phone",
    "original_amount",
    "due_date",
    "creditor_name",
    "account_type",
];

const REQUIRED_HEADERS: [&str; 3] = ["external_ref", "debtor_name", "original_amount"];

const MAX_EXTERNAL_REF_LEN: usize = 100;

/// A validated placement record, one per CSV data row
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub external_ref: String,
    pub debtor_name: String,
    pub original_amount: Decimal,
    pub debtor_ssn_last4: Option<String>,
    pub debtor_email: Option<String>,
    pub debtor_phone: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub creditor_name: Option<String>,
    pub account_type: Option<String>,
}

/// A record together with the file line it came from, so downstream errors
/// can point back at the source row
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub line: usize,
    pub record: ImportRecord,
}

/// A row that failed validation. `data` keeps the raw column values for the
/// job's error log.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub error: String,
    pub data: Value,
}

impl RowError {
    pub fn to_json(&self) -> Value {
        json!({ "line": self.line, "error": self.error, "data": self.data })
    }
}

/// Result of parsing one file: rows that passed validation and rows that
/// did not. A missing required column aborts with a single line-1 error.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
}

/// Parse a placement CSV from any reader.
///
/// The header row is line 1; data rows are numbered from 2. Fields are
/// whitespace-trimmed before validation. Each invalid row produces exactly
/// one error (the first failed check) and never aborts the rest of the file.
pub fn parse_placement_csv<R: Read>(source: R, file_name: &str) -> ParseOutcome {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.to_string()).collect(),
        Err(e) => {
            return ParseOutcome {
                rows: Vec::new(),
                errors: vec![RowError {
                    line: 1,
                    error: format!("Unreadable header row: {}", e),
                    data: json!({}),
                }],
            };
        }
    };

    let present: HashSet<&str> = headers.iter().map(|s| s.as_str()).collect();
    let mut missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .filter(|h| !present.contains(**h))
        .copied()
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return ParseOutcome {
            rows: Vec::new(),
            errors: vec![RowError {
                line: 1,
                error: format!("Missing required columns: {}", missing.join(", ")),
                data: json!({}),
            }],
        };
    }

    let mut outcome = ParseOutcome::default();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                outcome.errors.push(RowError {
                    line,
                    error: format!("Unreadable row: {}", e),
                    data: json!({}),
                });
                continue;
            }
        };
        let raw = raw_row(&headers, &record);
        match validate_row(&raw) {
            Ok(parsed) => outcome.rows.push(ParsedRow {
                line,
                record: parsed,
            }),
            Err(error) => outcome.errors.push(RowError {
                line,
                error,
                data: row_to_json(&raw),
            }),
        }
    }

    info!(
        "Parsed {} valid records, {} errors from {}",
        outcome.rows.len(),
        outcome.errors.len(),
        file_name
    );
    outcome
}

/// Zip header names with row values; short rows read as empty fields
fn raw_row<'a>(headers: &'a [String], record: &'a csv::StringRecord) -> Vec<(&'a str, &'a str)> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), record.get(i).unwrap_or("")))
        .collect()
}

fn row_to_json(raw: &[(&str, &str)]) -> Value {
    Value::Object(
        raw.iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
}

fn field<'a>(raw: &'a [(&str, &str)], name: &str) -> &'a str {
    raw.iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| *v)
        .unwrap_or("")
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn validate_row(raw: &[(&str, &str)]) -> Result<ImportRecord, String> {
    let external_ref = field(raw, "external_ref");
    if external_ref.is_empty() || external_ref.len() > MAX_EXTERNAL_REF_LEN {
        return Err(format!(
            "external_ref is required and must be <= {} chars",
            MAX_EXTERNAL_REF_LEN
        ));
    }

    let debtor_name = field(raw, "debtor_name");
    if debtor_name.is_empty() {
        return Err("debtor_name is required".to_string());
    }

    let original_amount: Decimal = field(raw, "original_amount")
        .parse()
        .map_err(|_| "original_amount must be a valid decimal".to_string())?;
    if original_amount <= Decimal::ZERO {
        return Err("original_amount must be positive".to_string());
    }

    let ssn = field(raw, "debtor_ssn_last4");
    if !ssn.is_empty() && (ssn.len() != 4 || !ssn.chars().all(|c| c.is_ascii_digit())) {
        return Err("debtor_ssn_last4 must be exactly 4 digits".to_string());
    }

    let email = field(raw, "debtor_email");
    if !email.is_empty() && !email.contains('@') {
        return Err("Invalid email format".to_string());
    }

    let due_date = match field(raw, "due_date") {
        "" => None,
        s => Some(parse_due_date(s).ok_or("due_date must be in YYYY-MM-DD format")?),
    };

    Ok(ImportRecord {
        external_ref: external_ref.to_string(),
        debtor_name: debtor_name.to_string(),
        original_amount,
        debtor_ssn_last4: optional(ssn),
        debtor_email: optional(email),
        debtor_phone: optional(field(raw, "debtor_phone")),
        due_date,
        creditor_name: optional(field(raw, "creditor_name")),
        account_type: optional(field(raw, "account_type")),
    })
}

/// Strict `YYYY-MM-DD`: the shape check rejects one-digit months and days,
/// which chrono's `%m`/`%d` would otherwise accept
fn parse_due_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str =
        "external_ref,debtor_name,debtor_ssn_last4,debtor_email,debtor_phone,original_amount,due_date,creditor_name,account_type";

    fn parse(body: &str) -> ParseOutcome {
        let data = format!("{}\n{}", HEADER, body);
        parse_placement_csv(data.as_bytes(), "test.csv")
    }

    #[test]
    fn test_parse_valid_row() {
        let outcome = parse(
            "ACC-001,Jane Doe,1234,jane@example.com,555-0100,1500.00,2024-06-01,Acme Bank,credit_card",
        );
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.rows.len(), 1);

        let row = &outcome.rows[0];
        assert_eq!(row.line, 2);
        assert_eq!(row.record.external_ref, "ACC-001");
        assert_eq!(row.record.debtor_name, "Jane Doe");
        assert_eq!(row.record.original_amount, dec!(1500.00));
        assert_eq!(row.record.debtor_ssn_last4.as_deref(), Some("1234"));
        assert_eq!(
            row.record.due_date,
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(row.record.account_type.as_deref(), Some("credit_card"));
    }

    #[test]
    fn test_optional_fields_absent() {
        let outcome = parse("ACC-002,John Roe,,,,250.50,,,");
        assert!(outcome.errors.is_empty());
        let record = &outcome.rows[0].record;
        assert_eq!(record.debtor_ssn_last4, None);
        assert_eq!(record.debtor_email, None);
        assert_eq!(record.debtor_phone, None);
        assert_eq!(record.due_date, None);
        assert_eq!(record.creditor_name, None);
    }

    #[test]
    fn test_missing_required_columns_aborts() {
        let data = "external_ref,debtor_email\nACC-001,jane@example.com";
        let outcome = parse_placement_csv(data.as_bytes(), "bad.csv");
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].line, 1);
        assert_eq!(
            outcome.errors[0].error,
            "Missing required columns: debtor_name, original_amount"
        );
    }

    #[test]
    fn test_missing_external_ref() {
        let outcome = parse(",Jane Doe,,,,100.00,,,");
        assert_eq!(
            outcome.errors[0].error,
            "external_ref is required and must be <= 100 chars"
        );
        assert_eq!(outcome.errors[0].line, 2);
    }

    #[test]
    fn test_external_ref_too_long() {
        let long_ref = "X".repeat(101);
        let outcome = parse(&format!("{},Jane Doe,,,,100.00,,,", long_ref));
        assert_eq!(
            outcome.errors[0].error,
            "external_ref is required and must be <= 100 chars"
        );
    }

    #[test]
    fn test_missing_debtor_name() {
        let outcome = parse("ACC-001,,,,,100.00,,,");
        assert_eq!(outcome.errors[0].error, "debtor_name is required");
    }

    #[test]
    fn test_invalid_amount() {
        let outcome = parse("ACC-001,Jane Doe,,,,not-a-number,,,");
        assert_eq!(
            outcome.errors[0].error,
            "original_amount must be a valid decimal"
        );
    }

    #[test]
    fn test_non_positive_amount() {
        let outcome = parse("ACC-001,Jane Doe,,,,0,,,\nACC-002,John Roe,,,,-5.00,,,");
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.errors[0].error, "original_amount must be positive");
        assert_eq!(outcome.errors[1].error, "original_amount must be positive");
    }

    #[test]
    fn test_bad_ssn() {
        let outcome = parse("ACC-001,Jane Doe,12a4,,,100.00,,,\nACC-002,John Roe,123,,,100.00,,,");
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(
            outcome.errors[0].error,
            "debtor_ssn_last4 must be exactly 4 digits"
        );
    }

    #[test]
    fn test_bad_email() {
        let outcome = parse("ACC-001,Jane Doe,,plainaddress,,100.00,,,");
        assert_eq!(outcome.errors[0].error, "Invalid email format");
    }

    #[test]
    fn test_bad_due_date() {
        let outcome = parse(
            "ACC-001,Jane Doe,,,,100.00,06/01/2024,,\nACC-002,John Roe,,,,100.00,2024-1-5,,",
        );
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(
            outcome.errors[0].error,
            "due_date must be in YYYY-MM-DD format"
        );
        // One-digit month/day is rejected even though chrono would parse it
        assert_eq!(
            outcome.errors[1].error,
            "due_date must be in YYYY-MM-DD format"
        );
    }

    #[test]
    fn test_error_keeps_raw_data_and_line() {
        let outcome = parse(
            "ACC-001,Jane Doe,,,,100.00,,,\n,Missing Ref,,,,50.00,,,\nACC-003,John Roe,,,,75.00,,,",
        );
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.errors.len(), 1);

        let err = &outcome.errors[0];
        assert_eq!(err.line, 3);
        assert_eq!(err.data["debtor_name"], "Missing Ref");
        assert_eq!(err.data["original_amount"], "50.00");

        // Valid rows keep their own line numbers around the bad one
        assert_eq!(outcome.rows[0].line, 2);
        assert_eq!(outcome.rows[1].line, 4);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let outcome = parse("  ACC-001  , Jane Doe ,,,, 100.00 ,,,");
        assert!(outcome.errors.is_empty());
        let record = &outcome.rows[0].record;
        assert_eq!(record.external_ref, "ACC-001");
        assert_eq!(record.debtor_name, "Jane Doe");
        assert_eq!(record.original_amount, dec!(100.00));
    }

    #[test]
    fn test_short_row_reads_missing_fields_as_empty() {
        let outcome = parse("ACC-001,Jane Doe,1234,jane@example.com,555-0100,100.00");
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.rows[0].record.due_date, None);
    }

    #[test]
    fn test_row_error_to_json_shape() {
        let err = RowError {
            line: 7,
            error: "debtor_name is required".to_string(),
            data: json!({"external_ref": "ACC-009"}),
        };
        let value = err.to_json();
        assert_eq!(value["line"], 7);
        assert_eq!(value["error"], "debtor_name is required");
        assert_eq!(value["data"]["external_ref"], "ACC-009");
    }
}
