pub mod cleaner;
pub mod error;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

pub use self::error::{DriverError, Result};
use self::http_client::HttpClient;
use self::parsers::{TableResponse, parse_table_response, render_pagination};

// ── Page driver ───────────────────────────────────────────────────────────────

/// Drives the paginated history table one page at a time.
///
/// Expected end-of-data conditions come back as empty rows / `false`.
/// `Err` is reserved for faults the engine cannot recover from.
#[async_trait]
pub trait PageDriver: Send {
    /// Open the table and load its first page.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Raw cell text of every row on the current page, in display order.
    async fn current_page_rows(&mut self) -> Result<Vec<Vec<String>>>;

    /// The table's "showing A to B of C" line; empty when unavailable.
    async fn pagination_info_text(&mut self) -> Result<String>;

    async fn has_next_page(&mut self) -> Result<bool>;

    /// Move to the next page. `false` means the move did not happen.
    async fn advance_to_next_page(&mut self) -> Result<bool>;
}

// ── tgju DataTables driver ────────────────────────────────────────────────────

/// Pages through tgju's history table via the DataTables server-side
/// endpoint that backs it (`start` / `length` windows, newest first).
pub struct TgjuDriver {
    client: HttpClient,
    page_size: u32,
    endpoint: Option<Url>,
    start: u64,
    draw: u64,
    page: Option<TableResponse>,
}

impl TgjuDriver {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            page_size: config.page_size.max(1),
            endpoint: None,
            start: 0,
            draw: 0,
            page: None,
        })
    }

    /// URL for the window beginning at row offset `start`.
    fn window_url(&self, endpoint: &Url, start: u64) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("lang", "fa")
            .append_pair("draw", &(self.draw + 1).to_string())
            .append_pair("start", &start.to_string())
            .append_pair("length", &self.page_size.to_string());
        url
    }

    async fn fetch_window(&mut self, start: u64) -> Result<TableResponse> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| DriverError::Setup("navigate() was not called".into()))?;
        let url = self.window_url(&endpoint, start);

        let body = self.client.get_text(&url).await?;
        let resp = parse_table_response(&body)?;
        self.draw += 1;

        debug!(
            "Window at {}: {} rows of {}",
            start,
            resp.data.len(),
            resp.available()
        );
        Ok(resp)
    }

    fn rows_on_page(&self) -> u64 {
        self.page.as_ref().map(|p| p.data.len() as u64).unwrap_or(0)
    }
}

#[async_trait]
impl PageDriver for TgjuDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let endpoint =
            Url::parse(url).map_err(|e| DriverError::Setup(format!("Bad table URL {url}: {e}")))?;
        info!("Navigating to {}", endpoint);

        self.endpoint = Some(endpoint);
        self.start = 0;
        self.draw = 0;
        self.page = Some(self.fetch_window(0).await?);
        Ok(())
    }

    async fn current_page_rows(&mut self) -> Result<Vec<Vec<String>>> {
        let rows = self.page.as_ref().map(TableResponse::rows).unwrap_or_default();
        if rows.is_empty() {
            warn!("No table rows found on current page");
        } else {
            info!("Found {} rows on current page", rows.len());
        }
        Ok(rows)
    }

    async fn pagination_info_text(&mut self) -> Result<String> {
        let Some(page) = self.page.as_ref() else {
            return Ok(String::new());
        };
        let rows = page.data.len() as u64;
        if rows == 0 {
            return Ok(String::new());
        }
        Ok(render_pagination(
            self.start + 1,
            self.start + rows,
            page.available(),
        ))
    }

    async fn has_next_page(&mut self) -> Result<bool> {
        let Some(page) = self.page.as_ref() else {
            return Ok(false);
        };
        let rows = self.rows_on_page();
        Ok(rows > 0 && self.start + rows < page.available())
    }

    async fn advance_to_next_page(&mut self) -> Result<bool> {
        let next = self.start + self.rows_on_page();
        match self.fetch_window(next).await {
            Ok(resp) => {
                self.start = next;
                self.page = Some(resp);
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to load rows from offset {}: {}", next, e);
                Ok(false)
            }
        }
    }
}
