//! Cursor pagination helpers.

use std::future::Future;

/// Cursor-based page info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPageInfo {
    /// Whether there is another page.
    pub has_next_page: bool,
    /// Cursor for the next page.
    pub end_cursor: Option<String>,
}

/// Cursor-based page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPage<T> {
    /// Items in the page.
    pub items: Vec<T>,
    /// Pagination info.
    pub page_info: CursorPageInfo,
}

/// Page limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit {
    /// Maximum number of items to fetch.
    pub max_items: usize,
}

impl PageLimit {
    /// Create a new limit.
    #[must_use]
    pub const fn new(max_items: usize) -> Self {
        Self { max_items }
    }
}

/// Walk a cursor-based API until it reports no further pages or `limit`
/// items have been collected.
///
/// `fetch_page` receives the cursor to continue from (`None` for the first
/// page).
pub async fn paginate_cursor<T, F, Fut, E>(
    mut cursor: Option<String>,
    limit: Option<PageLimit>,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<CursorPage<T>, E>>,
{
    let mut out = Vec::new();
    loop {
        let page = fetch_page(cursor.clone()).await?;
        match limit {
            Some(limit) => {
                let remaining = limit.max_items.saturating_sub(out.len());
                out.extend(page.items.into_iter().take(remaining));
                if out.len() >= limit.max_items {
                    break;
                }
            }
            None => out.extend(page.items),
        }

        if !page.page_info.has_next_page {
            break;
        }
        cursor.clone_from(&page.page_info.end_cursor);
        if cursor.is_none() {
            break;
        }
    }

    Ok(out)
}
