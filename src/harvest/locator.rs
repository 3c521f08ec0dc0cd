//! Content locator cascade.
//!
//! An ordered list of structural strategies is tried against the live page;
//! the first strategy yielding at least one handle wins, and a strategy that
//! errors (absent DOM, stale reference) counts as zero results rather than a
//! failure. When nothing matches at all the caller falls back to a
//! whole-surface text scan.

use chromiumoxide::{Element, Page};
use std::future::Future;
use tracing::debug;

/// Structural container strategies, in priority order.
pub const CONTAINER_STRATEGIES: &[(&str, &str)] = &[
    ("comment-main-content", "div.comments-comment-item__main-content"),
    ("comment-item", "li.comments-comment-item, div.comments-comment-item"),
    ("commentary-block", "div.commentary"),
    ("shared-comments-list", "div.feed-shared-comments-list"),
    ("article", "article"),
    ("generic-comment", ".comment"),
];

/// Sub-locators for a candidate's display name, in priority order.
const NAME_LOCATORS: &[&str] = &[
    ".comments-post-meta__name-text",
    ".feed-shared-actor__name",
    "a[href*='/in/']",
    ".commenter-name",
];

/// Sub-locators for a candidate's body text, in priority order. When all of
/// them fail the candidate's full inner text is used instead.
const BODY_LOCATORS: &[&str] = &[
    ".comments-comment-item__main-content",
    ".comment-body",
    ".feed-shared-update-v2__description",
];

/// A located comment candidate after text resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: Option<String>,
    pub body: String,
}

/// Run `query` over `strategies` in order and return the first non-empty
/// yield. A per-strategy error is logged and treated as zero results; an
/// exhausted list returns the empty vec.
pub async fn first_yielding<H, F, Fut>(
    strategies: &[(&'static str, &'static str)],
    mut query: F,
) -> Vec<H>
where
    F: FnMut(&'static str) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<H>>>,
{
    for &(label, selector) in strategies {
        match query(selector).await {
            Ok(handles) if !handles.is_empty() => {
                debug!(strategy = label, count = handles.len(), "locator strategy matched");
                return handles;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(strategy = label, "locator strategy failed, treating as empty: {}", e);
            }
        }
    }
    Vec::new()
}

/// Locate comment-candidate handles on the page via the strategy cascade.
pub async fn locate_candidates(page: &Page) -> Vec<Element> {
    first_yielding(CONTAINER_STRATEGIES, |selector| async move {
        page.find_elements(selector)
            .await
            .map_err(|e| anyhow::anyhow!("query '{}' failed: {}", selector, e))
    })
    .await
}

/// Resolve a candidate's display name and body text.
///
/// Name and body each walk their sub-locator list; the first non-empty text
/// wins. A candidate whose body stays empty after the full-inner-text
/// fallback is dropped. Any failure on this handle is absorbed here and never
/// aborts the processing of sibling handles.
pub async fn resolve_candidate(handle: &Element) -> Option<Candidate> {
    let name = first_text(handle, NAME_LOCATORS).await;

    let body = match first_text(handle, BODY_LOCATORS).await {
        Some(body) => Some(body),
        None => handle
            .inner_text()
            .await
            .ok()
            .flatten()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
    }?;

    Some(Candidate { name, body })
}

async fn first_text(handle: &Element, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Ok(el) = handle.find_element(*selector).await else {
            continue;
        };
        if let Ok(Some(text)) = el.inner_text().await {
            let text = text.trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const STRATEGIES: &[(&str, &str)] = &[
        ("first", "sel-a"),
        ("second", "sel-b"),
        ("third", "sel-c"),
    ];

    #[tokio::test]
    async fn first_non_empty_strategy_wins() {
        let got = first_yielding(STRATEGIES, |sel| async move {
            Ok(match sel {
                "sel-b" => vec!["b1", "b2"],
                "sel-c" => vec!["c1"],
                _ => vec![],
            })
        })
        .await;
        assert_eq!(got, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn errors_count_as_zero_results() {
        let got = first_yielding(STRATEGIES, |sel| async move {
            match sel {
                "sel-a" => Err(anyhow!("stale reference")),
                "sel-b" => Ok(vec![]),
                _ => Ok(vec![42u32]),
            }
        })
        .await;
        assert_eq!(got, vec![42]);
    }

    #[tokio::test]
    async fn exhausted_cascade_returns_empty() {
        let got: Vec<u8> = first_yielding(STRATEGIES, |_| async { Err(anyhow!("no dom")) }).await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn query_order_follows_priority() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _: Vec<u8> = first_yielding(STRATEGIES, |sel| {
            seen.lock().unwrap().push(sel);
            async { Ok(vec![]) }
        })
        .await;
        assert_eq!(*seen.lock().unwrap(), vec!["sel-a", "sel-b", "sel-c"]);
    }
}
