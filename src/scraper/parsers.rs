use crate::models::PaginationInfo;
use crate::utils::fmt_number;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;

// ── Cell text ─────────────────────────────────────────────────────────────────

/// Visible text of a table cell. The data source wraps change columns in
/// `<span class="high|low">…</span>`; plain cells pass through trimmed.
pub fn cell_text(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return raw.trim().to_string();
    }
    let fragment = Html::parse_fragment(raw);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

// ── Pagination info ───────────────────────────────────────────────────────────

// "نمایش 1 تا 30 از مجموع 3,648 مورد"
static RE_PAGINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"نمایش\s*([0-9]+)\s*تا\s*([0-9]+)\s*از\s*مجموع\s*([0-9,]+)\s*مورد").unwrap()
});

/// Map Persian (U+06F0..) and Arabic-Indic (U+0660..) digits to ASCII.
fn ascii_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '٬' => ',',
            _ => c,
        })
        .collect()
}

/// Parse the localized "showing A to B of total C items" line.
/// Anything that doesn't match yields a zeroed (unknown) info.
pub fn parse_pagination(text: &str) -> PaginationInfo {
    let text = ascii_digits(text);
    let Some(caps) = RE_PAGINATION.captures(&text) else {
        return PaginationInfo::default();
    };

    let start = caps[1].parse::<u64>();
    let end = caps[2].parse::<u64>();
    let total = caps[3].replace(',', "").parse::<u64>();

    match (start, end, total) {
        (Ok(start), Ok(end), Ok(total)) => PaginationInfo::new(start, end, total),
        _ => PaginationInfo::default(),
    }
}

/// Render the info line the way the table widget shows it.
pub fn render_pagination(start: u64, end: u64, total: u64) -> String {
    format!(
        "نمایش {} تا {} از مجموع {} مورد",
        start,
        end,
        fmt_number(total as i64)
    )
}

// ── DataTables server-side reply ──────────────────────────────────────────────

/// JSON reply of a DataTables server-side endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    #[serde(default, deserialize_with = "lenient_count")]
    pub records_total: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub records_filtered: u64,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl TableResponse {
    /// Rows as raw cell strings, in column order.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.data
            .iter()
            .map(|row| row.iter().map(value_text).collect())
            .collect()
    }

    /// Rows reachable through paging. Falls back to the grand total when
    /// the server leaves `recordsFiltered` out.
    pub fn available(&self) -> u64 {
        if self.records_filtered > 0 {
            self.records_filtered
        } else {
            self.records_total
        }
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Some backends send counts as strings ("3648").
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().replace(',', "").parse().unwrap_or(0),
        _ => 0,
    })
}

pub fn parse_table_response(body: &str) -> serde_json::Result<TableResponse> {
    serde_json::from_str(body)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_strips_markup() {
        assert_eq!(cell_text("  613,000 "), "613,000");
        assert_eq!(cell_text(r#"<span class="low">-1,250</span>"#), "-1,250");
        assert_eq!(cell_text(r#"<span class="high">0.2%</span>"#), "0.2%");
        assert_eq!(cell_text("a &amp; b"), "a & b");
    }

    #[test]
    fn test_parse_pagination() {
        let info = parse_pagination("نمایش 1 تا 30 از مجموع 3,648 مورد");
        assert_eq!(info, PaginationInfo::new(1, 30, 3648));
        assert_eq!(info.page_size, 30);

        let info = parse_pagination("  نمایش 3631 تا 3648 از مجموع 3,648 مورد\n");
        assert_eq!(info.start, 3631);
        assert_eq!(info.page_size, 18);
    }

    #[test]
    fn test_parse_pagination_persian_digits() {
        let info = parse_pagination("نمایش ۳۱ تا ۶۰ از مجموع ۳٬۶۴۸ مورد");
        assert_eq!(info, PaginationInfo::new(31, 60, 3648));
    }

    #[test]
    fn test_parse_pagination_unknown_is_zeroed() {
        for text in ["", "Showing 1 to 30 of 3,648 entries", "نمایش تا از مجموع مورد"] {
            let info = parse_pagination(text);
            assert_eq!(info, PaginationInfo::default(), "{text:?}");
            assert_eq!(info.page_size, 0);
        }
    }

    #[test]
    fn test_render_then_parse_pagination() {
        let text = render_pagination(61, 90, 12_345);
        assert_eq!(text, "نمایش 61 تا 90 از مجموع 12,345 مورد");
        assert_eq!(parse_pagination(&text), PaginationInfo::new(61, 90, 12_345));
    }

    #[test]
    fn test_parse_table_response() {
        let body = r#"{
            "draw": 1,
            "recordsTotal": 3648,
            "recordsFiltered": "3,648",
            "data": [
                ["612,450", "610,100", "615,900", "613,000",
                 "<span class=\"high\">550</span>", "<span class=\"high\">0.09%</span>",
                 "2024/06/10", "1403/03/21"],
                [612000, null, "1", "2", "", "", "2024/06/09", "1403/03/20"]
            ]
        }"#;

        let resp = parse_table_response(body).unwrap();
        assert_eq!(resp.records_total, 3648);
        assert_eq!(resp.available(), 3648);

        let rows = resp.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 8);
        assert_eq!(rows[0][6], "2024/06/10");
        assert_eq!(rows[1][0], "612000");
        assert_eq!(rows[1][1], "");
    }

    #[test]
    fn test_parse_table_response_empty() {
        let resp = parse_table_response(r#"{"recordsTotal": 0, "data": []}"#).unwrap();
        assert!(resp.rows().is_empty());
        assert_eq!(resp.available(), 0);
    }
}
