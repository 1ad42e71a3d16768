//! Group and membership repository.
//!
//! Role and status changes are conditional updates: they match only when the
//! row is still in the expected state, and report `None`/`false` otherwise.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{
    GroupEntity, GroupMemberEntity, GroupRoleDb, MembershipStatusDb, SuccessorCandidateEntity,
};
use crate::metrics::QueryTimer;

const GROUP_COLUMNS: &str = "id, name, description, privacy, creator_id, created_at, updated_at";
const MEMBER_COLUMNS: &str =
    "group_id, user_id, role, status, invited_by, accepted_at, created_at, updated_at";

/// Repository for the groups and group_members tables.
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_group_by_id");
        let result = sqlx::query_as::<_, GroupEntity>(&format!(
            "SELECT {} FROM groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Inserts the group and the creator's accepted row in one transaction.
    pub async fn create_with_creator(
        &self,
        group: &GroupEntity,
    ) -> Result<GroupMemberEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_group");
        let result = async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO groups (id, name, description, privacy, creator_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(group.id)
            .bind(&group.name)
            .bind(&group.description)
            .bind(group.privacy)
            .bind(group.creator_id)
            .bind(group.created_at)
            .bind(group.updated_at)
            .execute(&mut *tx)
            .await?;

            let member = sqlx::query_as::<_, GroupMemberEntity>(&format!(
                r#"
                INSERT INTO group_members (group_id, user_id, role, status, accepted_at)
                VALUES ($1, $2, 'creator', 'accepted', NOW())
                RETURNING {}
                "#,
                MEMBER_COLUMNS
            ))
            .bind(group.id)
            .bind(group.creator_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(member)
        }
        .await;
        timer.finish(result)
    }

    pub async fn find_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMemberEntity>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        succession::find_member(&mut conn, group_id, user_id).await
    }

    /// Accepted members in acceptance order.
    pub async fn list_accepted(&self, group_id: Uuid) -> Result<Vec<GroupMemberEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_accepted_members");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            r#"
            SELECT {}
            FROM group_members
            WHERE group_id = $1 AND status = 'accepted'
            ORDER BY accepted_at, user_id
            "#,
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    pub async fn insert_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRoleDb,
        status: MembershipStatusDb,
        invited_by: Option<Uuid>,
    ) -> Result<GroupMemberEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_group_member");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            r#"
            INSERT INTO group_members (group_id, user_id, role, status, invited_by, accepted_at)
            VALUES ($1, $2, $3, $4, $5, CASE WHEN $4 = 'accepted'::membership_status THEN NOW() END)
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .bind(status)
        .bind(invited_by)
        .fetch_one(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Moves the row from `from` to `to`. Entering `accepted` stamps `accepted_at`.
    pub async fn transition_status(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        from: MembershipStatusDb,
        to: MembershipStatusDb,
        invited_by: Option<Uuid>,
    ) -> Result<Option<GroupMemberEntity>, sqlx::Error> {
        let timer = QueryTimer::new("transition_member_status");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            r#"
            UPDATE group_members
            SET status = $4,
                invited_by = COALESCE($5, invited_by),
                accepted_at = CASE WHEN $4 = 'accepted'::membership_status THEN NOW() ELSE accepted_at END,
                updated_at = NOW()
            WHERE group_id = $1 AND user_id = $2 AND status = $3
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(from)
        .bind(to)
        .bind(invited_by)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Changes the role of an accepted member still holding `from`.
    pub async fn update_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRoleDb,
        to: GroupRoleDb,
    ) -> Result<Option<GroupMemberEntity>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        succession::update_role(&mut conn, group_id, user_id, from, to).await
    }

    pub async fn delete_plain_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        succession::delete_plain_member(&mut conn, group_id, user_id).await
    }

    /// Groups with accepted members but no accepted creator or admin.
    pub async fn find_without_authority(&self, limit: i64) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("find_groups_without_authority");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT group_id
            FROM group_members
            WHERE status = 'accepted'
            GROUP BY group_id
            HAVING COUNT(*) FILTER (WHERE role IN ('creator', 'admin')) = 0
            ORDER BY group_id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }
}

/// Statements run on one connection, usually inside a transaction that holds
/// the group lock.
pub mod succession {
    use super::*;

    pub async fn find_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMemberEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_group_member");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            "SELECT {} FROM group_members WHERE group_id = $1 AND user_id = $2",
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.finish(result)
    }

    pub async fn update_role(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
        from: GroupRoleDb,
        to: GroupRoleDb,
    ) -> Result<Option<GroupMemberEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_member_role");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            r#"
            UPDATE group_members
            SET role = $4, updated_at = NOW()
            WHERE group_id = $1 AND user_id = $2 AND status = 'accepted' AND role = $3
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *conn)
        .await;
        timer.finish(result)
    }

    pub async fn delete_plain_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_plain_member");
        let result = sqlx::query(
            r#"
            DELETE FROM group_members
            WHERE group_id = $1 AND user_id = $2 AND status = 'accepted' AND role = 'member'
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await;
        Ok(timer.finish(result)?.rows_affected() > 0)
    }

    /// Reads the group and holds its row lock until the transaction ends.
    pub async fn lock_group(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Option<GroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_group");
        let result = sqlx::query_as::<_, GroupEntity>(&format!(
            "SELECT {} FROM groups WHERE id = $1 FOR UPDATE",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.finish(result)
    }

    pub async fn delete_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMemberEntity>, sqlx::Error> {
        let timer = QueryTimer::new("delete_group_member");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            "DELETE FROM group_members WHERE group_id = $1 AND user_id = $2 RETURNING {}",
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.finish(result)
    }

    pub async fn authority_holders(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Vec<GroupMemberEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_authority_holders");
        let result = sqlx::query_as::<_, GroupMemberEntity>(&format!(
            r#"
            SELECT {}
            FROM group_members
            WHERE group_id = $1 AND status = 'accepted' AND role IN ('creator', 'admin')
            ORDER BY accepted_at, user_id
            "#,
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await;
        timer.finish(result)
    }

    /// Accepted plain members with their group posts, group events and
    /// comments on group content.
    pub async fn successor_candidates(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Vec<SuccessorCandidateEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_successor_candidates");
        let result = sqlx::query_as::<_, SuccessorCandidateEntity>(
            r#"
            SELECT
                gm.user_id,
                gm.accepted_at,
                (
                    (SELECT COUNT(*) FROM group_posts gp
                     WHERE gp.group_id = gm.group_id AND gp.owner_id = gm.user_id)
                  + (SELECT COUNT(*) FROM events e
                     WHERE e.group_id = gm.group_id AND e.owner_id = gm.user_id)
                  + (SELECT COUNT(*) FROM comments c
                     WHERE c.owner_id = gm.user_id
                       AND ((c.parent_kind = 'group_post' AND c.parent_id IN
                                (SELECT id FROM group_posts WHERE group_id = gm.group_id))
                         OR (c.parent_kind = 'event' AND c.parent_id IN
                                (SELECT id FROM events WHERE group_id = gm.group_id))))
                )::BIGINT AS authored_count
            FROM group_members gm
            WHERE gm.group_id = $1 AND gm.status = 'accepted' AND gm.role = 'member'
            ORDER BY gm.accepted_at, gm.user_id
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await;
        timer.finish(result)
    }

    /// Returns whether a row was updated.
    pub async fn set_role(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
        role: GroupRoleDb,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("set_member_role");
        let result = sqlx::query(
            "UPDATE group_members SET role = $3, updated_at = NOW() WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .execute(&mut *conn)
        .await;
        Ok(timer.finish(result)?.rows_affected() > 0)
    }

    pub async fn set_creator_reference(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("set_creator_reference");
        let result = sqlx::query("UPDATE groups SET creator_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await;
        Ok(timer.finish(result)?.rows_affected() > 0)
    }
}
