use serde::{Deserialize, Deserializer, Serialize};

use crate::scraper::cleaner::parse_price;

// ── Daily price record ────────────────────────────────────────────────────────

/// One calendar day of EUR/IRR prices. Keyed by `gregorian_date` (`YYYY/MM/DD`).
///
/// Serde names match the persisted CSV header, so the column order of this
/// struct is the column order of the dataset file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    #[serde(rename = "Open Price", deserialize_with = "lenient_price")]
    pub open_price: Option<i64>,
    #[serde(rename = "Low Price", deserialize_with = "lenient_price")]
    pub low_price: Option<i64>,
    #[serde(rename = "High Price", deserialize_with = "lenient_price")]
    pub high_price: Option<i64>,
    #[serde(rename = "Close Price", deserialize_with = "lenient_price")]
    pub close_price: Option<i64>,
    #[serde(rename = "Change Amount")]
    pub change_amount: Option<String>,
    #[serde(rename = "Change Percent")]
    pub change_percent: Option<String>,
    #[serde(rename = "Gregorian Date")]
    pub gregorian_date: String,
    #[serde(rename = "Persian Date")]
    pub persian_date: String,
}

impl Record {
    /// A record may enter the dataset only with a date and a close price.
    pub fn is_valid(&self) -> bool {
        !self.gregorian_date.is_empty() && self.close_price.is_some()
    }
}

/// Older dataset files were written with float price columns ("61250.0").
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_price))
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// Bounds shown by the table's "showing A to B of C" line.
/// All zero means "unknown", not "empty page".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationInfo {
    pub start: u64,
    pub end: u64,
    pub total: u64,
    pub page_size: u64,
}

impl PaginationInfo {
    pub fn new(start: u64, end: u64, total: u64) -> Self {
        Self {
            start,
            end,
            total,
            page_size: (end + 1).saturating_sub(start),
        }
    }

    pub fn is_known(&self) -> bool {
        self.total > 0
    }
}

// ── Dataset summary ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub latest_date: Option<String>,
    pub oldest_date: Option<String>,
    pub date_range: Option<String>,
}
