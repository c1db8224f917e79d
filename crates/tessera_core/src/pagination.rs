//! Pagination strategies.

use crate::adapter::LedgerAdapter;
use crate::error::CoreResult;
use tessera_ledger::Selector;
use tessera_model::StoredFragment;

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Fragments in ascending key order.
    pub docs: Vec<StoredFragment>,
    /// Cursor resuming after this page's last fragment.
    pub next_bookmark: Option<String>,
    /// Whether the query is exhausted.
    ///
    /// This flag is the only end-of-results signal; callers must not infer
    /// the end from `docs.len()` or from bookmark absence.
    pub done: bool,
}

/// A strategy producing pages over a scope.
///
/// Both strategies share one contract: concatenating successive pages over
/// a fixed collection yields every matching record exactly once, and `done`
/// becomes `true` on the first page shorter than `page_size`.
pub trait PaginationStrategy {
    /// Returns the page after `bookmark`.
    fn page(
        &self,
        adapter: &LedgerAdapter,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> CoreResult<Page>;
}

/// Delegates to the store's own cursor support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePagination;

impl PaginationStrategy for NativePagination {
    fn page(
        &self,
        adapter: &LedgerAdapter,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> CoreResult<Page> {
        let paged = adapter.query_page(selector, page_size, bookmark)?;
        let done = paged.docs.len() < page_size;
        Ok(Page {
            next_bookmark: paged.next_bookmark,
            done,
            docs: paged.docs,
        })
    }
}

/// Client-side pagination for scopes without native cursor support.
///
/// Selects everything matching the selector, sorts by primary key
/// lexicographically, and slices after the bookmark. O(collection size) per
/// page by design: private collections are org-scoped and small, and the
/// full scan keeps the bookmark contract identical to the native strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmulatedPagination;

impl PaginationStrategy for EmulatedPagination {
    fn page(
        &self,
        adapter: &LedgerAdapter,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> CoreResult<Page> {
        let mut all = adapter.raw_query(selector)?;
        all.sort_by(|a, b| a.key().cmp(b.key()));

        let start = match bookmark {
            None => 0,
            Some(mark) => all.partition_point(|doc| doc.key() <= mark),
        };
        let docs: Vec<StoredFragment> = all
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();

        let done = docs.len() < page_size;
        let next_bookmark = docs.last().map(|doc| doc.key().to_string());
        Ok(Page {
            docs,
            next_bookmark,
            done,
        })
    }
}

/// Which strategy a repository uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationMode {
    /// Use the backend's cursor ([`NativePagination`]).
    #[default]
    Native,
    /// Sort-and-slice client side ([`EmulatedPagination`]).
    Emulated,
}

impl PaginationMode {
    /// Runs one page with the selected strategy.
    pub fn page(
        self,
        adapter: &LedgerAdapter,
        selector: &Selector,
        page_size: usize,
        bookmark: Option<&str>,
    ) -> CoreResult<Page> {
        match self {
            Self::Native => NativePagination.page(adapter, selector, page_size, bookmark),
            Self::Emulated => EmulatedPagination.page(adapter, selector, page_size, bookmark),
        }
    }
}
