//! Offset/limit pagination utilities.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of items returned when a request does not specify a limit.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Upper bound on the number of items a single page may contain.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Error type for pagination parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("Offset must not be negative")]
    NegativeOffset,
    #[error("Limit must be positive")]
    NonPositiveLimit,
}

/// Page limits applied when normalizing a [`PageRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

/// Requested window into an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Creates a page request, rejecting negative offsets and non-positive limits.
    pub fn new(offset: i64, limit: i64) -> Result<Self, PaginationError> {
        if offset < 0 {
            return Err(PaginationError::NegativeOffset);
        }
        if limit <= 0 {
            return Err(PaginationError::NonPositiveLimit);
        }
        Ok(Self { offset, limit })
    }

    /// Builds a request from optional query values, falling back to defaults
    /// and clamping the limit into `1..=max_limit`.
    pub fn from_parts(offset: Option<i64>, limit: Option<i64>, limits: PageLimits) -> Self {
        Self {
            offset: offset.unwrap_or(0).max(0),
            limit: limit
                .unwrap_or(limits.default_limit)
                .clamp(1, limits.max_limit),
        }
    }

    /// Returns a copy whose limit is clamped into `1..=max_limit`.
    pub fn clamped(self, limits: PageLimits) -> Self {
        Self::from_parts(Some(self.offset), Some(self.limit), limits)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: i64,
    pub limit: i64,
    /// Whether at least one more item exists after this page.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Builds a page from up to `limit + 1` fetched items; the extra item only
    /// signals that another page exists and is dropped.
    pub fn from_overfetch(mut items: Vec<T>, request: PageRequest) -> Self {
        let limit = request.limit.max(0) as usize;
        let has_more = items.len() > limit;
        items.truncate(limit);
        Self {
            items,
            offset: request.offset,
            limit: request.limit,
            has_more,
        }
    }

    /// Offset of the following page, if there is one.
    pub fn next_offset(&self) -> Option<i64> {
        self.has_more
            .then(|| self.offset + self.items.len() as i64)
    }
}
