use std::future::Future;

use anyhow::Result;

pub const PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub per_page: u32,
}

impl PageCursor {
    pub fn first() -> Self {
        Self {
            page: 1,
            per_page: PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` once the server reports there is nothing left.
    pub next_page: Option<u32>,
}

/// Everything gathered before the loop ended, plus the error that ended it early.
#[derive(Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub error: Option<anyhow::Error>,
}

impl<T> Paginated<T> {
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

/// Walk a list endpoint page by page, starting at page 1, until the server
/// stops handing out a next page or a request fails. Pages are never revisited.
pub async fn paginate<T, F, Fut>(mut fetch: F) -> Paginated<T>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut cursor = PageCursor::first();
    let mut items = Vec::new();

    loop {
        let page = match fetch(cursor).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(page = cursor.page, error = %err, "pagination stopped early");
                return Paginated {
                    items,
                    error: Some(err),
                };
            }
        };
        tracing::debug!(page = cursor.page, count = page.items.len(), "fetched page");
        items.extend(page.items);

        match page.next_page {
            Some(next) if next > cursor.page => cursor.page = next,
            Some(next) => {
                tracing::warn!(
                    page = cursor.page,
                    next,
                    "server returned a non-advancing next page, stopping"
                );
                break;
            }
            None => break,
        }
    }

    Paginated { items, error: None }
}
