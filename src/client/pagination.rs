use serde_json::{Map, Value};

use super::{Pacer, RemoteClient};
use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Upper bound on pages fetched from one listing.
const MAX_PAGES: u32 = 1000;

/// Record-shaped items found in one page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub enum PageItems {
    /// A bare array, or an array under `data`. Non-object entries are dropped.
    Many(Vec<Map<String, Value>>),
    /// `{"data": {...}}`: a single record; no further pages.
    Single(Map<String, Value>),
    /// Nothing usable.
    Empty,
}

pub fn page_items(value: Value) -> PageItems {
    let objects = |items: Vec<Value>| {
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    match value {
        Value::Array(items) => PageItems::Many(objects(items)),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => PageItems::Many(objects(items)),
            Some(Value::Object(item)) => PageItems::Single(item),
            _ => PageItems::Empty,
        },
        _ => PageItems::Empty,
    }
}

/// Fetch every page of a listing endpoint.
///
/// Requests `page=1,2,...` with a fixed `per_page` until a page yields fewer
/// records than the page size, nothing at all, or a single `data` object.
/// WordPress answers a page past the end with HTTP 400; after the first page
/// that ends the listing instead of failing it.
pub async fn fetch_all_pages<C: RemoteClient + ?Sized>(
    client: &C,
    url: &str,
    params: &[(String, String)],
    page_size: u32,
    pacer: &Pacer,
) -> Result<Vec<Value>> {
    let page_size = page_size.max(1);
    let mut all = Vec::new();
    let mut page: u32 = 1;

    loop {
        let mut query: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| k != "page" && k != "per_page")
            .cloned()
            .collect();
        query.push(("page".to_string(), page.to_string()));
        query.push(("per_page".to_string(), page_size.to_string()));

        pacer.wait().await;
        let data = match client.get(url, &query).await {
            Ok(data) => data,
            Err(Error::Api { status: 400, message }) if page > 1 => {
                log::warn!("Listing {url} ended at page {page}: {message}");
                break;
            }
            Err(e) => return Err(e),
        };

        match page_items(data) {
            PageItems::Many(items) => {
                let count = items.len();
                all.extend(items.into_iter().map(Value::Object));
                if count < page_size as usize {
                    break;
                }
            }
            PageItems::Single(item) => {
                all.push(Value::Object(item));
                break;
            }
            PageItems::Empty => break,
        }

        if page >= MAX_PAGES {
            log::warn!("Listing {url} stopped after {MAX_PAGES} pages");
            break;
        }
        page += 1;
    }

    log::debug!("Fetched {} items from {url}", all.len());
    Ok(all)
}
