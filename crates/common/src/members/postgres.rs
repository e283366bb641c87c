//! Postgres adapters for the member collaborators

use super::{BlacklistGate, RecentMemberSource};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::graph::MemberId;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, Statement, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Block list backed by the `member_blocks` table
pub struct PgBlacklistGate {
    db: DbPool,
    chunk_size: usize,
}

impl PgBlacklistGate {
    pub fn new(db: DbPool, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.max(1),
        }
    }
}

/// `$first, $first+1, ...` for `count` bind parameters
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl BlacklistGate for PgBlacklistGate {
    async fn blocked_among(&self, requester: MemberId, candidates: &[MemberId]) -> Result<HashSet<MemberId>> {
        let mut blocked = HashSet::new();
        let conn = self.db.read();

        for chunk in candidates.chunks(self.chunk_size) {
            let sql = format!(
                "SELECT blocked_id FROM member_blocks WHERE requester_id = $1 AND blocked_id IN ({})",
                placeholders(2, chunk.len())
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
            values.push(requester.0.into());
            values.extend(chunk.iter().map(|id| Value::from(id.0)));

            let rows = conn
                .query_all(Statement::from_sql_and_values(DbBackend::Postgres, &sql, values))
                .await?;

            for row in rows {
                let id: i64 = row.try_get("", "blocked_id")?;
                blocked.insert(MemberId(id));
            }
        }

        debug!(requester = %requester, candidates = candidates.len(), blocked = blocked.len(), "Block list checked");
        Ok(blocked)
    }
}

/// Member directory backed by the `members` table
pub struct PgMemberSource {
    db: DbPool,
    max_scan: usize,
}

impl PgMemberSource {
    /// `max_scan` caps the rows read per `fetch_recent` call
    pub fn new(db: DbPool, max_scan: usize) -> Self {
        Self { db, max_scan }
    }
}

#[async_trait]
impl RecentMemberSource for PgMemberSource {
    async fn fetch_recent(&self, exclude: &HashSet<MemberId>, count: usize) -> Result<Vec<MemberId>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        // Over-fetch by the exclusion size so filtering can't leave us short
        let limit = (count + exclude.len()).min(self.max_scan.max(count));
        if limit < count + exclude.len() {
            warn!(count, excluded = exclude.len(), limit, "Recent member scan capped");
        }

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                    SELECT id
                    FROM members
                    WHERE withdrawn_at IS NULL
                    ORDER BY created_at DESC, id DESC
                    LIMIT $1
                "#,
                vec![(limit as i64).into()],
            ))
            .await?;

        let mut recent = Vec::with_capacity(count);
        for row in rows {
            let id = MemberId(row.try_get::<i64>("", "id")?);
            if !exclude.contains(&id) {
                recent.push(id);
                if recent.len() == count {
                    break;
                }
            }
        }
        Ok(recent)
    }

    async fn member_exists(&self, member: MemberId) -> Result<bool> {
        let row = self
            .db
            .read()
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT EXISTS(SELECT 1 FROM members WHERE id = $1 AND withdrawn_at IS NULL) AS present",
                vec![member.0.into()],
            ))
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "EXISTS query returned no row".to_string(),
            })?;

        Ok(row.try_get::<bool>("", "present")?)
    }
}
