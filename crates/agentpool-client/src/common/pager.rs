//! `nextLink` pagination

use crate::common::{decode_json, HttpClient};
use crate::error::ArmError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;

/// One page of an ARM list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

enum Source<T> {
    Remote {
        http: HttpClient,
        next: Option<String>,
    },
    Static(VecDeque<Result<Vec<T>, ArmError>>),
}

/// Lazily fetched sequence of list pages
///
/// Each call to [`Pager::next_page`] issues at most one request.
pub struct Pager<T> {
    source: Source<T>,
}

impl<T> fmt::Debug for Pager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Remote { next, .. } => f.debug_struct("Pager").field("next", next).finish(),
            Source::Static(pages) => f
                .debug_struct("Pager")
                .field("remaining", &pages.len())
                .finish(),
        }
    }
}

impl<T: DeserializeOwned> Pager<T> {
    /// Pager starting at `url` and following `nextLink`
    pub(crate) fn remote(http: HttpClient, url: String) -> Self {
        Self {
            source: Source::Remote {
                http,
                next: Some(url),
            },
        }
    }

    /// Pager over pre-built pages
    pub fn from_pages(pages: Vec<Vec<T>>) -> Self {
        Self::from_results(pages.into_iter().map(Ok).collect())
    }

    /// Pager over pre-built page results, errors included
    pub fn from_results(pages: Vec<Result<Vec<T>, ArmError>>) -> Self {
        Self {
            source: Source::Static(pages.into()),
        }
    }

    /// Whether another page may be fetched
    pub fn more(&self) -> bool {
        match &self.source {
            Source::Remote { next, .. } => next.is_some(),
            Source::Static(pages) => !pages.is_empty(),
        }
    }

    /// Fetch the next page, or `None` once the sequence is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, ArmError> {
        match &mut self.source {
            Source::Remote { http, next } => {
                let Some(url) = next.take() else {
                    return Ok(None);
                };
                let response = http.send(reqwest::Method::GET, &url, None).await?;
                let page: Page<T> = decode_json(&response.body)?;
                *next = page.next_link.filter(|link| !link.is_empty());
                Ok(Some(page.value))
            }
            Source::Static(pages) => pages.pop_front().transpose(),
        }
    }

    /// Drain every remaining page into a single vector
    pub async fn collect_all(mut self) -> Result<Vec<T>, ArmError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_pages_drain_in_order() {
        let pager = Pager::from_pages(vec![vec![1, 2], vec![], vec![3]]);
        assert!(pager.more());
        assert_eq!(pager.collect_all().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_static_page_error_stops_collection() {
        let pager: Pager<u32> = Pager::from_results(vec![
            Ok(vec![1]),
            Err(ArmError::Decode("bad page".to_string())),
            Ok(vec![2]),
        ]);
        let err = pager.collect_all().await.unwrap_err();
        assert!(matches!(err, ArmError::Decode(_)));
    }

    #[test]
    fn test_page_without_next_link() {
        let page: Page<u32> = serde_json::from_str(r#"{"value":[7]}"#).unwrap();
        assert_eq!(page.value, vec![7]);
        assert!(page.next_link.is_none());
    }
}
