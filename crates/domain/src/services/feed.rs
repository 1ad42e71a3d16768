//! Feed composer.
//!
//! A viewer's feed is the de-duplicated union of their own posts, `followers`
//! posts of accounts they follow, public posts, `custom` posts listing them and
//! posts in groups they belong to. Rows are ordered by creation time
//! descending, ties by id descending, and every row passes the visibility
//! engine before it is counted towards the page.

use std::collections::HashSet;

use shared::pagination::{Page, PageLimits, PageRequest};
use tracing::debug;
use uuid::Uuid;

use super::visibility::VisibilityEngine;
use crate::error::DomainError;
use crate::models::ContentItem;
use crate::store::{FeedCursor, FeedQuery, SocialStore};

/// Candidate rows fetched from the store per round trip.
pub const DEFAULT_FEED_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub batch_size: i64,
    pub limits: PageLimits,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_FEED_BATCH_SIZE,
            limits: PageLimits::default(),
        }
    }
}

/// Composes feeds out of posts and group posts only. Events and comments are
/// never feed items, including the viewer's own personal events; they are
/// reached through their group or parent instead.
#[derive(Clone)]
pub struct FeedComposer<S> {
    store: S,
    visibility: VisibilityEngine<S>,
    options: FeedOptions,
}

impl<S: SocialStore> FeedComposer<S> {
    pub fn new(store: S, options: FeedOptions) -> Self {
        Self {
            visibility: VisibilityEngine::new(store.clone()),
            store,
            options,
        }
    }

    /// One page of the viewer's feed. `has_more` is exact: one extra visible
    /// row is looked up past the page.
    pub async fn compose(
        &self,
        viewer_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<ContentItem>, DomainError> {
        let page = page.clamped(self.options.limits);
        let wanted = (page.limit + 1) as usize;
        let batch_size = self.options.batch_size.max(1);

        let mut seen = HashSet::new();
        let mut skipped = 0i64;
        let mut items = Vec::with_capacity(wanted);
        let mut cursor = None;

        'batches: loop {
            let rows = self
                .store
                .feed_candidates(FeedQuery {
                    viewer_id,
                    before: cursor,
                    limit: batch_size,
                })
                .await?;
            let exhausted = (rows.len() as i64) < batch_size;

            for row in rows {
                cursor = Some(FeedCursor::after(&row));
                if !seen.insert(row.id) {
                    continue;
                }
                if !self.visibility.can_view(viewer_id, &row).await? {
                    continue;
                }
                if skipped < page.offset {
                    skipped += 1;
                    continue;
                }
                items.push(row);
                if items.len() >= wanted {
                    break 'batches;
                }
            }

            if exhausted {
                break;
            }
        }

        debug!(
            viewer_user_id = %viewer_id,
            offset = page.offset,
            limit = page.limit,
            returned = items.len().min(page.limit as usize),
            "Feed composed"
        );

        Ok(Page::from_overfetch(items, page))
    }
}
