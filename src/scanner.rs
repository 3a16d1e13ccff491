//! Paginated full-table reads
//!
//! Pages are fetched strictly one after another because each scan call needs the
//! continuation key returned by the previous one.

use crate::client::{Item, TableClient};
use crate::error::Result;
use std::sync::Arc;

/// Drives a full-table scan one page at a time
pub struct PageScanner {
    client: Arc<dyn TableClient>,
    table_name: String,
    page_size: i32,
    continuation: Option<Item>,
    pages: u64,
    finished: bool,
}

impl PageScanner {
    pub fn new(
        client: Arc<dyn TableClient>,
        table_name: impl Into<String>,
        page_size: i32,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            page_size: page_size.max(1),
            continuation: None,
            pages: 0,
            finished: false,
        }
    }

    /// Starts the scan after `key` instead of at the beginning of the table
    pub fn resume_from(mut self, key: Item) -> Self {
        self.continuation = Some(key);
        self
    }

    /// The key the next page will start after
    pub fn continuation_key(&self) -> Option<&Item> {
        self.continuation.as_ref()
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` once the previous page came back without a continuation key;
    /// from then on no further store calls are made. A page may be empty while more
    /// pages remain. Any scan error is returned as-is and leaves the position unchanged.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Item>>> {
        if self.finished {
            return Ok(None);
        }

        let page = self
            .client
            .scan_page(&self.table_name, self.page_size, self.continuation.clone())
            .await?;

        self.pages += 1;
        log::debug!(
            "scanned page {} of {}: {} items, more={}",
            self.pages,
            self.table_name,
            page.items.len(),
            page.last_evaluated_key.is_some()
        );

        match page.last_evaluated_key {
            Some(key) => self.continuation = Some(key),
            None => {
                self.continuation = None;
                self.finished = true;
            }
        }

        Ok(Some(page.items))
    }
}
