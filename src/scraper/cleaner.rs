use crate::models::Record;
use tracing::{debug, warn};

use super::parsers::cell_text;

/// Column layout of the history table, left to right.
pub const COLUMN_COUNT: usize = 8;

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse price: drop thousands separators and whitespace, truncate decimals.
/// "612,450" → 612450 | "61250.7" → 61250 | "" / "abc" → None
pub fn parse_price(s: &str) -> Option<i64> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.trunc() as i64)
}

/// Change amount / percent are kept as displayed, sign and all.
pub fn parse_change(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Accept `YYYY/MM/DD` by shape only. "2024/13/40" passes; "2024-01-02" does not.
pub fn parse_date(s: &str) -> Option<String> {
    let s = s.trim();
    let bytes = s.as_bytes();
    if bytes.len() != 10 {
        return None;
    }
    let shaped = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'/',
        _ => b.is_ascii_digit(),
    });
    shaped.then(|| s.to_string())
}

// ── Table row → Record ────────────────────────────────────────────────────────

/// Turn one table row into a record.
///
/// Cells are expected in display order: open, low, high, close,
/// change amount, change percent, gregorian date, persian date.
/// Cells may still carry inline markup; it is stripped before parsing.
pub fn extract_record(cells: &[String]) -> Option<Record> {
    if cells.len() < COLUMN_COUNT {
        warn!("Row has insufficient cells: {}", cells.len());
        return None;
    }

    let text: Vec<String> = cells.iter().take(COLUMN_COUNT).map(|c| cell_text(c)).collect();

    let record = Record {
        open_price: parse_price(&text[0]),
        low_price: parse_price(&text[1]),
        high_price: parse_price(&text[2]),
        close_price: parse_price(&text[3]),
        change_amount: parse_change(&text[4]),
        change_percent: parse_change(&text[5]),
        gregorian_date: parse_date(&text[6]).unwrap_or_default(),
        persian_date: text[7].trim().to_string(),
    };

    if !record.is_valid() {
        warn!("Invalid row data: {:?}", text);
        return None;
    }

    debug!("Extracted row {}", record.gregorian_date);
    Some(record)
}

/// Extract every valid record on a page, preserving page order.
pub fn extract_records(rows: &[Vec<String>]) -> Vec<Record> {
    rows.iter().filter_map(|cells| extract_record(cells)).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
