//! List pagination
//!
//! A continuation token is the key of the last entry returned. The next
//! call skips every entry up to and including that key.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One page of a list operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub entries: Vec<T>,
    /// Pass back as the starting token to fetch the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next_token: None,
        }
    }
}

/// Cut one page out of `items`.
///
/// `max_entries == 0` means no limit. A starting token that matches no
/// entry is an error; the caller restarts the listing.
pub fn paginate<T, F>(
    items: Vec<T>,
    key: F,
    starting_token: Option<&str>,
    max_entries: usize,
) -> Result<Page<T>>
where
    F: Fn(&T) -> &str,
{
    let start = match starting_token.filter(|token| !token.is_empty()) {
        Some(token) => {
            let position = items
                .iter()
                .position(|item| key(item) == token)
                .ok_or_else(|| Error::InvalidStartingToken(token.to_string()))?;
            position + 1
        }
        None => 0,
    };

    let remaining = items.len().saturating_sub(start);
    let take = if max_entries == 0 {
        remaining
    } else {
        max_entries.min(remaining)
    };

    let entries: Vec<T> = items.into_iter().skip(start).take(take).collect();
    let next_token = if take < remaining {
        entries.last().map(|last| key(last).to_string())
    } else {
        None
    };

    Ok(Page {
        entries,
        next_token,
    })
}
