//! Stateful pagination over a query.
//!
//! # Design
//! A [`Paginator`] owns a copy of the query and rewrites its `page` before
//! every fetch, so the caller's query is never touched. The page counter only
//! moves after a fetch succeeds, and [`Paginator::next`] advances only when
//! the previous page reported `more`. Running out of pages is `Ok(None)`,
//! never an error.
//!
//! Pages come from any [`PageSource`]: the HTTP
//! [`Client`](crate::transport::Client) and the line-protocol
//! [`LineSource`](crate::line::LineSource) both implement it.
//!
//! Changing the filter of a query mid-iteration is not supported; build a new
//! paginator instead.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::query::Query;
use crate::types::Page;

/// Something that can fetch one page of a query.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page<M>(&self, query: &Query) -> Result<Page<M>, ApiError>
    where
        M: DeserializeOwned + Send;
}

pub struct Paginator<'a, S: ?Sized, M> {
    source: &'a S,
    query: Query,
    current: Option<Page<M>>,
    current_page_num: u32,
    more: bool,
    exit_after: Option<u32>,
}

impl<'a, S, M> Paginator<'a, S, M>
where
    S: PageSource + ?Sized,
    M: DeserializeOwned + Clone + Send,
{
    /// Wrap `query`, fixing its page size to `page_size`.
    pub fn new(source: &'a S, query: &Query, page_size: u32) -> Result<Self, ApiError> {
        let mut query = query.clone();
        query.set_results(page_size)?;
        Ok(Self {
            source,
            query,
            current: None,
            current_page_num: 0,
            more: true,
            exit_after: None,
        })
    }

    /// Stop after `pages` successful fetches, whatever the server says.
    pub fn with_exit_after(mut self, pages: u32) -> Self {
        self.exit_after = Some(pages);
        self
    }

    /// Number of the last fetched page; 0 before the first fetch.
    pub fn current_page_num(&self) -> u32 {
        self.current_page_num
    }

    /// The last fetched page, without fetching.
    pub fn current(&self) -> Option<&Page<M>> {
        self.current.as_ref()
    }

    pub fn more(&self) -> bool {
        self.more
    }

    pub fn remaining(&self) -> Option<u32> {
        self.exit_after
    }

    /// Fetch the next page. `Ok(None)` once there is nothing left.
    pub async fn next(&mut self) -> Result<Option<Page<M>>, ApiError> {
        if self.exit_after == Some(0) {
            return Ok(None);
        }
        let target = match self.current_page_num {
            0 => 1,
            n if self.more => n + 1,
            _ => return Ok(None),
        };
        let page = self.fetch(target).await?;
        if let Some(left) = self.exit_after.as_mut() {
            *left = left.saturating_sub(1);
        }
        Ok(Some(page))
    }

    /// Refetch the page before the current one. `Ok(None)` on page 1.
    pub async fn previous(&mut self) -> Result<Option<Page<M>>, ApiError> {
        if self.current_page_num <= 1 {
            return Ok(None);
        }
        let page = self.fetch(self.current_page_num - 1).await?;
        Ok(Some(page))
    }

    /// Fetch every remaining page. Memory grows with the result set.
    pub async fn compress(&mut self) -> Result<Vec<Page<M>>, ApiError> {
        let mut pages = Vec::new();
        while let Some(page) = self.next().await? {
            if page.is_empty() {
                break;
            }
            pages.push(page);
        }
        Ok(pages)
    }

    /// Every remaining row, in order.
    pub async fn flatten(&mut self) -> Result<Vec<M>, ApiError> {
        let pages = self.compress().await?;
        Ok(pages.into_iter().flat_map(|page| page.results).collect())
    }

    /// Async iteration. Ends on exhaustion or an empty page; an error is
    /// yielded once and ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page<M>, ApiError>> + 'a
    where
        M: 'a,
    {
        stream::unfold(Some(self), |state| async move {
            let mut paginator = state?;
            match paginator.next().await {
                Ok(Some(page)) if !page.is_empty() => Some((Ok(page), Some(paginator))),
                Ok(_) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn fetch(&mut self, page_num: u32) -> Result<Page<M>, ApiError> {
        self.query.set_page(page_num)?;
        log::debug!(
            "fetching page {page_num} of {}",
            self.query.route().unwrap_or("<no route>")
        );
        let page: Page<M> = self.source.fetch_page(&self.query).await?;
        self.current_page_num = page_num;
        self.more = page.more;
        self.current = Some(page.clone());
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::select;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Serves `pages` rows per page and reports `more` until `last_page`.
    struct Scripted {
        last_page: Option<u32>,
        requested: Mutex<Vec<(u32, u32)>>,
    }

    impl Scripted {
        fn new(last_page: Option<u32>) -> Self {
            Self {
                last_page,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<(u32, u32)> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for Scripted {
        async fn fetch_page<M>(&self, query: &Query) -> Result<Page<M>, ApiError>
        where
            M: DeserializeOwned + Send,
        {
            let page = query.page_num();
            self.requested.lock().unwrap().push((page, query.page_size()));
            let more = self.last_page.map_or(true, |last| page < last);
            let body = json!({
                "results": [{"id": format!("v{page}")}],
                "more": more,
            });
            serde_json::from_value(body).map_err(|e| ApiError::DeserializationError(e.to_string()))
        }
    }

    fn query() -> Query {
        select(["id"]).from("vn").unwrap()
    }

    #[tokio::test]
    async fn stops_when_more_is_false() {
        let source = Scripted::new(Some(3));
        let paginator: Paginator<'_, _, Value> = Paginator::new(&source, &query(), 2).unwrap();
        let pages: Vec<_> = paginator.into_stream().collect().await;
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.is_ok()));
        assert_eq!(source.requested(), vec![(1, 2), (2, 2), (3, 2)]);
    }

    #[tokio::test]
    async fn exit_after_bounds_iteration() {
        let source = Scripted::new(None);
        let paginator: Paginator<'_, _, Value> = Paginator::new(&source, &query(), 10)
            .unwrap()
            .with_exit_after(2);
        let pages: Vec<_> = paginator.into_stream().collect().await;
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn next_is_noop_after_last_page() {
        let source = Scripted::new(Some(1));
        let mut paginator: Paginator<'_, _, Value> = Paginator::new(&source, &query(), 5).unwrap();
        assert_eq!(paginator.current_page_num(), 0);
        assert!(paginator.current().is_none());

        let first = paginator.next().await.unwrap().unwrap();
        assert_eq!(first.results[0]["id"], "v1");
        assert!(!paginator.more());
        assert!(paginator.next().await.unwrap().is_none());
        assert_eq!(paginator.current_page_num(), 1);
        assert_eq!(source.requested().len(), 1);
    }

    #[tokio::test]
    async fn previous_walks_back() {
        let source = Scripted::new(None);
        let mut paginator: Paginator<'_, _, Value> = Paginator::new(&source, &query(), 5).unwrap();
        assert!(paginator.previous().await.unwrap().is_none());
        paginator.next().await.unwrap();
        paginator.next().await.unwrap();
        paginator.next().await.unwrap();
        assert_eq!(paginator.current_page_num(), 3);

        let back = paginator.previous().await.unwrap().unwrap();
        assert_eq!(back.results[0]["id"], "v2");
        assert_eq!(paginator.current_page_num(), 2);
        assert_eq!(paginator.current().unwrap().results[0]["id"], "v2");
    }

    #[tokio::test]
    async fn flatten_collects_rows_in_order() {
        let source = Scripted::new(Some(3));
        let mut paginator: Paginator<'_, _, Value> = Paginator::new(&source, &query(), 1).unwrap();
        let rows = paginator.flatten().await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap().to_string()).collect();
        assert_eq!(ids, ["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn caller_query_is_untouched() {
        let source = Scripted::new(Some(2));
        let original = query();
        let mut paginator: Paginator<'_, _, Value> = Paginator::new(&source, &original, 3).unwrap();
        paginator.compress().await.unwrap();
        assert_eq!(original.page_num(), 1);
        assert_eq!(original.page_size(), 10);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let source = Scripted::new(None);
        let result: Result<Paginator<'_, _, Value>, _> = Paginator::new(&source, &query(), 0);
        assert!(matches!(result, Err(ApiError::Query(_))));
    }
}
