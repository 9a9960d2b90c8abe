//! Pipeline orchestrator: page driver → row extraction → dataset store.
//!
//! ## Run modes
//!
//! *Full*: no dataset yet (or forced). Every page is scraped until the table
//! runs out of rows or pages.
//!
//! *Incremental*: a dataset exists. Pages are scraped newest-first until a
//! page reaches the latest stored date; rows strictly newer than it are kept
//! and scraping stops there. Rows are assumed to be date-descending within
//! and across pages, which is the table's default order.
//!
//! Accepted rows are held in memory and merged into the store exactly once,
//! after the last page. Any failure or interruption before that point drops
//! the batch, so the dataset file is either untouched or fully updated.
//! Re-running with no upstream changes adds nothing.

use crate::config::PipelineConfig;
use crate::models::{DatasetSummary, Record};
use crate::scraper::cleaner::extract_records;
use crate::scraper::parsers::parse_pagination;
use crate::scraper::{DriverError, PageDriver};
use crate::storage::{DatasetStore, StoreError};
use crate::utils::{Timer, format_progress};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Page driver failed: {0}")]
    Driver(#[from] DriverError),

    #[error("Failed to save data: {0}")]
    Store(#[from] StoreError),

    #[error("Scraping interrupted by user")]
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    Full,
    Incremental,
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeMode::Full => f.write_str("full"),
            ScrapeMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Why the page loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Reached dates already in the dataset.
    KnownDate,
    /// A page produced no valid rows.
    NoData,
    /// Last page, or the table would not advance.
    NoNextPage,
}

#[derive(Debug)]
pub struct PipelineStats {
    pub mode: ScrapeMode,
    pub pages: usize,
    pub accepted: usize,
    pub new_records: usize,
    pub stop: StopReason,
    pub summary: DatasetSummary,
}

pub struct Pipeline<D: PageDriver> {
    driver: D,
    store: DatasetStore,
    table_url: String,
    config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
}

impl<D: PageDriver> Pipeline<D> {
    pub fn new(
        driver: D,
        store: DatasetStore,
        table_url: impl Into<String>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            driver,
            store,
            table_url: table_url.into(),
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between pages; setting it aborts the run without saving.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn mode(&self, force_full: bool) -> ScrapeMode {
        if force_full || self.config.full_scrape || self.store.is_empty() {
            ScrapeMode::Full
        } else {
            ScrapeMode::Incremental
        }
    }

    pub async fn run(&mut self, force_full: bool) -> Result<PipelineStats, PipelineError> {
        let mode = self.mode(force_full);
        let latest = match mode {
            ScrapeMode::Incremental => self.store.latest_date(),
            ScrapeMode::Full => None,
        };

        match mode {
            ScrapeMode::Incremental => info!(
                "Existing data found ({:?}). Running incremental update...",
                self.store.summary()
            ),
            ScrapeMode::Full => info!("Starting full scrape..."),
        }

        let timer = Timer::start(format!("{} scrape", mode));
        let pause = Duration::from_millis(self.config.page_delay_ms);

        self.driver.navigate(&self.table_url).await?;

        let first = parse_pagination(&self.driver.pagination_info_text().await?);
        if first.is_known() {
            info!("Total records available: {}", first.total);
        } else {
            warn!("Pagination info unavailable; progress will be reported as unknown");
        }

        let mut batch: Vec<Record> = Vec::new();
        let mut pages = 0usize;

        let stop = loop {
            self.check_cancelled()?;
            pages += 1;
            info!("--- Scraping page {} ---", pages);

            let rows = self.driver.current_page_rows().await?;
            let records = extract_records(&rows);
            info!("Extracted {} valid rows from page {}", records.len(), pages);

            if records.is_empty() {
                warn!("No data found on current page. Stopping.");
                break StopReason::NoData;
            }

            let caught_up = match latest.as_deref() {
                Some(latest) => {
                    let (fresh, caught_up) = split_at_known(records, latest);
                    if caught_up {
                        info!(
                            "Reached existing data ({}). Added {} new records from this page",
                            latest,
                            fresh.len()
                        );
                    }
                    batch.extend(fresh);
                    caught_up
                }
                None => {
                    batch.extend(records);
                    false
                }
            };

            let bounds = parse_pagination(&self.driver.pagination_info_text().await?);
            debug!(
                "Rows {}-{} of {} ({} per page)",
                bounds.start, bounds.end, bounds.total, bounds.page_size
            );
            info!("{}", format_progress(batch.len(), bounds.total, timer.elapsed()));

            if caught_up {
                break StopReason::KnownDate;
            }

            if !self.driver.has_next_page().await? {
                info!("Reached the last page");
                break StopReason::NoNextPage;
            }

            self.check_cancelled()?;
            tokio::time::sleep(pause).await;

            if !self.driver.advance_to_next_page().await? {
                warn!("Failed to navigate to next page");
                break StopReason::NoNextPage;
            }
        };

        info!(
            "Scraping completed after {} page(s) ({:?}). Total records scraped: {}",
            pages,
            stop,
            batch.len()
        );
        self.check_cancelled()?;

        let new_records = if batch.is_empty() {
            info!("No new data to save");
            0
        } else {
            let added = self.store.merge_and_persist(&batch)?;
            info!("Data saved successfully!");
            added
        };

        let summary = self.store.summary();
        info!("Final dataset summary: {:?}", summary);

        Ok(PipelineStats {
            mode,
            pages,
            accepted: batch.len(),
            new_records,
            stop,
            summary,
        })
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancelled.load(Ordering::SeqCst) {
            info!("Scraping interrupted by user");
            return Err(PipelineError::Interrupted);
        }
        Ok(())
    }
}

/// Keep rows strictly newer than `latest`; report whether the page reached it.
///
/// The first row is the fast path: if it is already known the whole page is.
/// A page that starts new but runs into known dates is the boundary page.
fn split_at_known(records: Vec<Record>, latest: &str) -> (Vec<Record>, bool) {
    let first_known = records
        .first()
        .is_some_and(|r| r.gregorian_date.as_str() <= latest);
    if first_known {
        return (Vec::new(), true);
    }

    let total = records.len();
    let fresh: Vec<Record> = records
        .into_iter()
        .filter(|r| r.gregorian_date.as_str() > latest)
        .collect();
    let caught_up = fresh.len() < total;
    (fresh, caught_up)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::parsers::render_pagination;
    use async_trait::async_trait;
    use tempfile::{TempDir, tempdir};
    use tokio_test::{assert_err, assert_ok};

    /// In-memory table: a fixed list of pages of raw rows.
    #[derive(Default)]
    struct FakeDriver {
        pages: Vec<Vec<Vec<String>>>,
        current: usize,
        navigated: bool,
        info_reads: usize,
        next_checks: usize,
        advances: usize,
        refuse_advance: bool,
        fail_rows_on_page: Option<usize>,
        cancel_after_page: Option<(usize, Arc<AtomicBool>)>,
    }

    impl FakeDriver {
        fn new(pages: Vec<Vec<Vec<String>>>) -> Self {
            Self {
                pages,
                ..Default::default()
            }
        }

        fn total(&self) -> usize {
            self.pages.iter().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl PageDriver for FakeDriver {
        async fn navigate(&mut self, _url: &str) -> crate::scraper::Result<()> {
            self.navigated = true;
            self.current = 0;
            Ok(())
        }

        async fn current_page_rows(&mut self) -> crate::scraper::Result<Vec<Vec<String>>> {
            if self.fail_rows_on_page == Some(self.current) {
                return Err(DriverError::Network("browser went away".into()));
            }
            if let Some((page, flag)) = &self.cancel_after_page {
                if *page == self.current {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            Ok(self.pages.get(self.current).cloned().unwrap_or_default())
        }

        async fn pagination_info_text(&mut self) -> crate::scraper::Result<String> {
            self.info_reads += 1;
            let before: usize = self.pages.iter().take(self.current).map(Vec::len).sum();
            let here = self.pages.get(self.current).map(Vec::len).unwrap_or(0);
            if here == 0 {
                return Ok(String::new());
            }
            Ok(render_pagination(
                before as u64 + 1,
                (before + here) as u64,
                self.total() as u64,
            ))
        }

        async fn has_next_page(&mut self) -> crate::scraper::Result<bool> {
            self.next_checks += 1;
            Ok(self.current + 1 < self.pages.len())
        }

        async fn advance_to_next_page(&mut self) -> crate::scraper::Result<bool> {
            if self.refuse_advance {
                return Ok(false);
            }
            self.advances += 1;
            self.current += 1;
            Ok(true)
        }
    }

    fn row(date: &str, close: i64) -> Vec<String> {
        vec![
            format!("{}", close - 1),
            format!("{}", close - 2),
            format!("{}", close + 2),
            format!("{},000", close),
            r#"<span class="high">1,000</span>"#.to_string(),
            "0.5%".to_string(),
            date.to_string(),
            "1402/10/12".to_string(),
        ]
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            page_delay_ms: 0,
            full_scrape: false,
        }
    }

    fn store_in(dir: &TempDir) -> DatasetStore {
        DatasetStore::open(dir.path().join("dataset.csv"))
    }

    fn seeded_store(dir: &TempDir, dates: &[&str]) -> DatasetStore {
        let mut store = store_in(dir);
        let records: Vec<Record> = dates
            .iter()
            .map(|d| crate::scraper::cleaner::extract_record(&row(d, 50)).unwrap())
            .collect();
        store.merge_and_persist(&records).unwrap();
        store
    }

    fn pipeline(driver: FakeDriver, store: DatasetStore) -> Pipeline<FakeDriver> {
        Pipeline::new(driver, store, "https://example.test/table", config())
    }

    fn stored_dates(p: &Pipeline<FakeDriver>) -> Vec<String> {
        p.store()
            .records()
            .iter()
            .map(|r| r.gregorian_date.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_single_page_into_empty_store() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::new(vec![vec![row("2024/01/02", 100), row("2024/01/01", 99)]]);
        let mut p = pipeline(driver, store_in(&dir));

        let stats = assert_ok!(p.run(false).await);
        assert_eq!(stats.mode, ScrapeMode::Full);
        assert_eq!(stats.stop, StopReason::NoNextPage);
        assert_eq!(stats.new_records, 2);
        assert_eq!(stats.summary.total_records, 2);
        assert_eq!(
            stats.summary.date_range.as_deref(),
            Some("2024/01/01 to 2024/01/02")
        );
        assert_eq!(stored_dates(&p), ["2024/01/02", "2024/01/01"]);
        assert_eq!(p.store().records()[0].close_price, Some(100_000));

        let on_disk = DatasetStore::open(dir.path().join("dataset.csv"));
        assert_eq!(on_disk.len(), 2);
    }

    #[tokio::test]
    async fn test_boundary_page_keeps_only_newer_rows() {
        let dir = tempdir().unwrap();
        let store = seeded_store(&dir, &["2024/01/01"]);
        let driver = FakeDriver::new(vec![
            vec![row("2024/01/03", 3), row("2024/01/02", 2), row("2024/01/01", 1)],
            vec![row("2023/12/31", 0)],
        ]);
        let mut p = pipeline(driver, store);

        let stats = assert_ok!(p.run(false).await);
        assert_eq!(stats.mode, ScrapeMode::Incremental);
        assert_eq!(stats.stop, StopReason::KnownDate);
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.new_records, 2);
        assert_eq!(stored_dates(&p), ["2024/01/03", "2024/01/02", "2024/01/01"]);
        // once for the total, once for the boundary page's progress line
        assert_eq!(p.driver.info_reads, 2);
        assert_eq!(p.driver.next_checks, 0);
        assert_eq!(p.driver.advances, 0);
    }

    #[tokio::test]
    async fn test_known_first_row_stops_without_next_page() {
        for first in ["2024/06/10", "2024/06/08"] {
            let dir = tempdir().unwrap();
            let store = seeded_store(&dir, &["2024/06/10", "2024/06/09"]);
            let before = std::fs::read(store.path()).unwrap();
            let driver = FakeDriver::new(vec![
                vec![row(first, 10), row("2024/06/07", 9)],
                vec![row("2024/06/06", 8)],
            ]);
            let mut p = pipeline(driver, store);

            let stats = assert_ok!(p.run(false).await);
            assert_eq!(stats.stop, StopReason::KnownDate);
            assert_eq!(stats.pages, 1);
            assert_eq!(stats.new_records, 0);
            assert_eq!(p.driver.info_reads, 2, "first row {first}");
            assert_eq!(p.driver.next_checks, 0, "first row {first}");
            assert_eq!(p.driver.advances, 0);
            assert_eq!(std::fs::read(p.store().path()).unwrap(), before);
        }
    }

    #[tokio::test]
    async fn test_full_mode_walks_every_page() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::new(vec![
            vec![row("2024/01/06", 6), row("2024/01/05", 5)],
            vec![row("2024/01/04", 4), row("2024/01/03", 3)],
            vec![row("2024/01/02", 2)],
        ]);
        let mut p = pipeline(driver, store_in(&dir));

        let stats = assert_ok!(p.run(false).await);
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.new_records, 5);
        assert_eq!(stats.stop, StopReason::NoNextPage);
        assert_eq!(p.driver.info_reads, 4);
        assert_eq!(p.driver.advances, 2);
    }

    #[tokio::test]
    async fn test_rerun_without_upstream_changes_adds_nothing() {
        let dir = tempdir().unwrap();
        let pages = vec![
            vec![row("2024/01/04", 4), row("2024/01/03", 3)],
            vec![row("2024/01/02", 2), row("2024/01/01", 1)],
        ];

        let mut first = pipeline(FakeDriver::new(pages.clone()), store_in(&dir));
        let stats = assert_ok!(first.run(false).await);
        assert_eq!(stats.new_records, 4);
        let snapshot = std::fs::read(first.store().path()).unwrap();

        for _ in 0..2 {
            let mut again = pipeline(FakeDriver::new(pages.clone()), store_in(&dir));
            let stats = assert_ok!(again.run(false).await);
            assert_eq!(stats.mode, ScrapeMode::Incremental);
            assert_eq!(stats.accepted, 0);
            assert_eq!(stats.new_records, 0);
            assert_eq!(std::fs::read(again.store().path()).unwrap(), snapshot);
        }
    }

    #[tokio::test]
    async fn test_page_without_valid_rows_ends_run() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::new(vec![
            vec![row("2024/01/02", 2)],
            vec![vec!["broken".to_string()]],
            vec![row("2023/12/01", 1)],
        ]);
        let mut p = pipeline(driver, store_in(&dir));

        let stats = assert_ok!(p.run(false).await);
        assert_eq!(stats.stop, StopReason::NoData);
        assert_eq!(stats.pages, 2);
        assert_eq!(stored_dates(&p), ["2024/01/02"]);
    }

    #[tokio::test]
    async fn test_empty_table_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut p = pipeline(FakeDriver::new(vec![vec![]]), store_in(&dir));

        let stats = assert_ok!(p.run(false).await);
        assert_eq!(stats.stop, StopReason::NoData);
        assert_eq!(stats.new_records, 0);
        assert!(!dir.path().join("dataset.csv").exists());
    }

    #[tokio::test]
    async fn test_driver_fault_discards_batch() {
        let dir = tempdir().unwrap();
        let store = seeded_store(&dir, &["2023/01/01"]);
        let before = std::fs::read(store.path()).unwrap();
        let mut driver = FakeDriver::new(vec![
            vec![row("2024/01/04", 4)],
            vec![row("2024/01/03", 3)],
        ]);
        driver.fail_rows_on_page = Some(1);
        let mut p = pipeline(driver, store);

        let err = assert_err!(p.run(false).await);
        assert!(matches!(err, PipelineError::Driver(_)));
        assert_eq!(std::fs::read(p.store().path()).unwrap(), before);
        assert_eq!(stored_dates(&p), ["2023/01/01"]);
    }

    #[tokio::test]
    async fn test_interrupt_between_pages_discards_batch() {
        let dir = tempdir().unwrap();
        let driver = FakeDriver::new(vec![
            vec![row("2024/01/04", 4)],
            vec![row("2024/01/03", 3)],
        ]);
        let mut p = pipeline(driver, store_in(&dir));
        // Ctrl-C arrives while the first page is being read
        p.driver.cancel_after_page = Some((0, p.cancel_handle()));

        let err = assert_err!(p.run(false).await);
        assert!(matches!(err, PipelineError::Interrupted));
        assert_eq!(p.driver.advances, 0);
        assert!(!dir.path().join("dataset.csv").exists());
    }

    #[tokio::test]
    async fn test_failed_advance_keeps_rows_so_far() {
        let dir = tempdir().unwrap();
        let mut driver = FakeDriver::new(vec![
            vec![row("2024/01/04", 4), row("2024/01/03", 3)],
            vec![row("2024/01/02", 2)],
        ]);
        driver.refuse_advance = true;
        let mut p = pipeline(driver, store_in(&dir));

        let stats = assert_ok!(p.run(false).await);
        assert_eq!(stats.stop, StopReason::NoNextPage);
        assert_eq!(stats.new_records, 2);
    }

    #[tokio::test]
    async fn test_forced_full_run_fills_gaps_without_overwriting() {
        let dir = tempdir().unwrap();
        let store = seeded_store(&dir, &["2024/01/03"]);
        let driver = FakeDriver::new(vec![
            vec![row("2024/01/04", 4), row("2024/01/03", 999)],
            vec![row("2024/01/02", 2)],
        ]);
        let mut p = pipeline(driver, store);

        let stats = assert_ok!(p.run(true).await);
        assert_eq!(stats.mode, ScrapeMode::Full);
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.new_records, 2);
        assert_eq!(stored_dates(&p), ["2024/01/04", "2024/01/03", "2024/01/02"]);
        assert_eq!(p.store().records()[1].close_price, Some(50_000));
    }

    #[test]
    fn test_split_at_known() {
        let recs = |dates: &[&str]| -> Vec<Record> {
            dates
                .iter()
                .map(|d| crate::scraper::cleaner::extract_record(&row(d, 1)).unwrap())
                .collect()
        };

        let (fresh, caught_up) = split_at_known(recs(&["2024/01/05", "2024/01/04"]), "2024/01/03");
        assert_eq!(fresh.len(), 2);
        assert!(!caught_up);

        let (fresh, caught_up) = split_at_known(recs(&["2024/01/05", "2024/01/03"]), "2024/01/03");
        assert_eq!(fresh.len(), 1);
        assert!(caught_up);

        let (fresh, caught_up) = split_at_known(recs(&["2024/01/03", "2024/01/02"]), "2024/01/03");
        assert!(fresh.is_empty());
        assert!(caught_up);
    }
}
