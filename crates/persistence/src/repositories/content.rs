//! Content repository: posts, group posts, comments, events, allow-lists and
//! event responses.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{
    CommentEntity, ContentKindDb, EventEntity, EventResponseEntity, FeedRowEntity,
    GroupPostEntity, PostEntity, VisibilityDb,
};
use crate::metrics::QueryTimer;

/// Table holding rows of the given kind.
fn table_of(kind: ContentKindDb) -> &'static str {
    match kind {
        ContentKindDb::Post => "posts",
        ContentKindDb::GroupPost => "group_posts",
        ContentKindDb::Comment => "comments",
        ContentKindDb::Event => "events",
    }
}

async fn insert_viewers(
    conn: &mut PgConnection,
    kind: ContentKindDb,
    item_id: Uuid,
    viewers: &[Uuid],
) -> Result<(), sqlx::Error> {
    if viewers.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO post_viewers (item_kind, item_id, user_id)
        SELECT $1, $2, viewer FROM UNNEST($3::uuid[]) AS viewer
        "#,
    )
    .bind(kind)
    .bind(item_id)
    .bind(viewers)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for every content table.
#[derive(Clone)]
pub struct ContentRepository {
    pool: PgPool,
}

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_post(&self, id: Uuid) -> Result<Option<PostEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_post");
        let result = sqlx::query_as::<_, PostEntity>(
            "SELECT id, owner_id, visibility, body, created_at, updated_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn find_group_post(&self, id: Uuid) -> Result<Option<GroupPostEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_group_post");
        let result = sqlx::query_as::<_, GroupPostEntity>(
            r#"
            SELECT id, group_id, owner_id, body, created_at, updated_at
            FROM group_posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn find_comment(&self, id: Uuid) -> Result<Option<CommentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_comment");
        let result = sqlx::query_as::<_, CommentEntity>(
            r#"
            SELECT id, parent_kind, parent_id, owner_id, body, created_at, updated_at
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn find_event(&self, id: Uuid) -> Result<Option<EventEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_event");
        let result = sqlx::query_as::<_, EventEntity>(
            r#"
            SELECT id, owner_id, group_id, visibility, title, description, starts_at,
                   created_at, updated_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Inserts a post with its allow-list.
    pub async fn insert_post(&self, post: &PostEntity, viewers: &[Uuid]) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_post");
        let result = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO posts (id, owner_id, visibility, body, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(post.id)
            .bind(post.owner_id)
            .bind(post.visibility)
            .bind(&post.body)
            .bind(post.created_at)
            .bind(post.updated_at)
            .execute(&mut *tx)
            .await?;
            insert_viewers(&mut tx, ContentKindDb::Post, post.id, viewers).await?;
            tx.commit().await
        }
        .await;
        timer.finish(result)
    }

    pub async fn insert_group_post(&self, post: &GroupPostEntity) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_group_post");
        let result = sqlx::query(
            r#"
            INSERT INTO group_posts (id, group_id, owner_id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(post.id)
        .bind(post.group_id)
        .bind(post.owner_id)
        .bind(&post.body)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await;
        timer.finish(result).map(drop)
    }

    pub async fn insert_comment(&self, comment: &CommentEntity) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_comment");
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, parent_kind, parent_id, owner_id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(comment.id)
        .bind(comment.parent_kind)
        .bind(comment.parent_id)
        .bind(comment.owner_id)
        .bind(&comment.body)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await;
        timer.finish(result).map(drop)
    }

    /// Inserts an event with its allow-list.
    pub async fn insert_event(&self, event: &EventEntity, viewers: &[Uuid]) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_event");
        let result = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO events (id, owner_id, group_id, visibility, title, description,
                                    starts_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.id)
            .bind(event.owner_id)
            .bind(event.group_id)
            .bind(event.visibility)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.starts_at)
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&mut *tx)
            .await?;
            insert_viewers(&mut tx, ContentKindDb::Event, event.id, viewers).await?;
            tx.commit().await
        }
        .await;
        timer.finish(result)
    }

    /// Sets the visibility of a post or personal event and swaps its whole
    /// allow-list in the same transaction.
    pub async fn replace_visibility(
        &self,
        kind: ContentKindDb,
        id: Uuid,
        visibility: VisibilityDb,
        viewers: &[Uuid],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let update = match kind {
            ContentKindDb::Post => "UPDATE posts SET visibility = $2, updated_at = $3 WHERE id = $1",
            ContentKindDb::Event => {
                "UPDATE events SET visibility = $2, updated_at = $3 WHERE id = $1 AND group_id IS NULL"
            }
            ContentKindDb::GroupPost | ContentKindDb::Comment => return Ok(false),
        };

        let timer = QueryTimer::new("replace_visibility");
        let result = async {
            let mut tx = self.pool.begin().await?;
            let updated = sqlx::query(update)
                .bind(id)
                .bind(visibility)
                .bind(updated_at)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if updated == 0 {
                return Ok(false);
            }

            sqlx::query("DELETE FROM post_viewers WHERE item_kind = $1 AND item_id = $2")
                .bind(kind)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_viewers(&mut tx, kind, id, viewers).await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(true)
        }
        .await;
        timer.finish(result)
    }

    pub async fn is_listed_viewer(
        &self,
        kind: ContentKindDb,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("is_listed_viewer");
        let result = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM post_viewers
                WHERE item_kind = $1 AND item_id = $2 AND user_id = $3
            )
            "#,
        )
        .bind(kind)
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn list_viewers(&self, kind: ContentKindDb, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("list_viewers");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM post_viewers
            WHERE item_kind = $1 AND item_id = $2
            ORDER BY user_id
            "#,
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Deletes the item with its comments and allow-list. Event responses go
    /// with the event through their foreign key.
    pub async fn delete_item(&self, kind: ContentKindDb, id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_content_item");
        let result = async {
            let mut tx = self.pool.begin().await?;
            let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", table_of(kind)))
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if deleted == 0 {
                return Ok(false);
            }

            sqlx::query("DELETE FROM comments WHERE parent_kind = $1 AND parent_id = $2")
                .bind(kind)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM post_viewers WHERE item_kind = $1 AND item_id = $2")
                .bind(kind)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(true)
        }
        .await;
        timer.finish(result)
    }

    pub async fn upsert_event_response(&self, response: &EventResponseEntity) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_event_response");
        let result = sqlx::query(
            r#"
            INSERT INTO event_responses (event_id, user_id, response, responded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, user_id)
            DO UPDATE SET response = EXCLUDED.response, responded_at = EXCLUDED.responded_at
            "#,
        )
        .bind(response.event_id)
        .bind(response.user_id)
        .bind(response.response)
        .bind(response.responded_at)
        .execute(&self.pool)
        .await;
        timer.finish(result).map(drop)
    }

    pub async fn list_event_responses(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<EventResponseEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_event_responses");
        let result = sqlx::query_as::<_, EventResponseEntity>(
            r#"
            SELECT event_id, user_id, response, responded_at
            FROM event_responses
            WHERE event_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Posts and group posts the viewer may see, newest first, strictly
    /// after the `(created_at, id)` keyset position when one is given.
    pub async fn feed_candidates(
        &self,
        viewer_id: Uuid,
        before: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<FeedRowEntity>, sqlx::Error> {
        let timer = QueryTimer::new("feed_candidates");
        let (before_at, before_id) = before.unzip();
        let result = sqlx::query_as::<_, FeedRowEntity>(
            r#"
            SELECT kind, id, owner_id, visibility, group_id, body, created_at, updated_at
            FROM (
                SELECT 'post'::content_kind AS kind, p.id, p.owner_id,
                       p.visibility, NULL::uuid AS group_id,
                       p.body, p.created_at, p.updated_at
                FROM posts p
                WHERE p.owner_id = $1
                   OR p.visibility = 'public'
                   OR (p.visibility = 'followers' AND EXISTS (
                        SELECT 1 FROM follows f
                        WHERE f.follower_id = $1 AND f.followee_id = p.owner_id
                          AND f.status = 'accepted'))
                   OR (p.visibility = 'custom' AND EXISTS (
                        SELECT 1 FROM post_viewers v
                        WHERE v.item_kind = 'post' AND v.item_id = p.id AND v.user_id = $1))

                UNION ALL

                SELECT 'group_post'::content_kind AS kind, gp.id, gp.owner_id,
                       NULL::content_visibility AS visibility, gp.group_id,
                       gp.body, gp.created_at, gp.updated_at
                FROM group_posts gp
                WHERE gp.owner_id = $1
                   OR EXISTS (
                        SELECT 1 FROM group_members gm
                        WHERE gm.group_id = gp.group_id AND gm.user_id = $1
                          AND gm.status = 'accepted')
            ) feed
            WHERE $2::timestamptz IS NULL OR (feed.created_at, feed.id) < ($2::timestamptz, $3::uuid)
            ORDER BY feed.created_at DESC, feed.id DESC
            LIMIT $4
            "#,
        )
        .bind(viewer_id)
        .bind(before_at)
        .bind(before_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }
}
