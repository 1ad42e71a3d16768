//! User and follow repositories.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{FollowEntity, FollowStatusDb, UserEntity};
use crate::metrics::QueryTimer;

/// Repository for the users table.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, nickname, profile, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn insert(&self, user: &UserEntity) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_user");
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, nickname, profile, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&user.nickname)
        .bind(user.profile)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;
        timer.finish(result).map(drop)
    }
}

/// Repository for the follows table.
#[derive(Clone)]
pub struct FollowRepository {
    pool: PgPool,
}

impl FollowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> Result<Option<FollowEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_follow");
        let result = sqlx::query_as::<_, FollowEntity>(
            r#"
            SELECT follower_id, followee_id, status, created_at, updated_at
            FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn insert(&self, follow: &FollowEntity) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("insert_follow");
        let result = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(follow.follower_id)
        .bind(follow.followee_id)
        .bind(follow.status)
        .bind(follow.created_at)
        .bind(follow.updated_at)
        .execute(&self.pool)
        .await;
        timer.finish(result).map(drop)
    }

    /// Moves the edge to `to` only while it is still `from`.
    pub async fn transition(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
        from: FollowStatusDb,
        to: FollowStatusDb,
    ) -> Result<Option<FollowEntity>, sqlx::Error> {
        let timer = QueryTimer::new("transition_follow");
        let result = sqlx::query_as::<_, FollowEntity>(
            r#"
            UPDATE follows
            SET status = $4, updated_at = NOW()
            WHERE follower_id = $1 AND followee_id = $2 AND status = $3
            RETURNING follower_id, followee_id, status, created_at, updated_at
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn delete(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_follow");
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await;
        Ok(timer.finish(result)?.rows_affected() > 0)
    }
}
