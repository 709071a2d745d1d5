//! SQLite state store.

use crate::error::StoreResult;
use crate::store::{ClassifiedChanges, StateStore, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drydock_core::{
    BuildRequest, BuildRequestId, BuildSetId, Change, ChangeId, Link, NewChange, NewSourceStamp,
    Properties, SchedulerState, SourceStamp, SourceStampId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::info;

/// Durable [`StateStore`] backed by SQLite via sqlx.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database at `url` and apply migrations.
    pub async fn open(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(url, "opened state store");
        Ok(Self { pool })
    }

    /// Open a private in-memory database. The pool is pinned to a single
    /// connection; a second connection would see a different database.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn change_from_row(row: &SqliteRow) -> StoreResult<Change> {
    let files: Vec<String> = serde_json::from_str(&row.get::<String, _>("files"))?;
    let links: Vec<Link> = serde_json::from_str(&row.get::<String, _>("links"))?;
    let properties: Properties = serde_json::from_str(&row.get::<String, _>("properties"))?;
    Ok(Change {
        id: ChangeId::new(row.get("id")),
        who: row.get("who"),
        files,
        comments: row.get("comments"),
        is_dir: row.get("is_dir"),
        links,
        revision: row.get("revision"),
        revlink: row.get("revlink"),
        when: row.get("when_ts"),
        branch: row.get("branch"),
        category: row.get("category"),
        properties,
        repository: row.get("repository"),
        project: row.get("project"),
    })
}

fn request_from_row(row: &SqliteRow) -> BuildRequest {
    BuildRequest {
        id: BuildRequestId::new(row.get("id")),
        buildset_id: BuildSetId::new(row.get("buildset_id")),
        builder_name: row.get("builder_name"),
        priority: row.get("priority"),
        submitted_at: row.get("submitted_at"),
    }
}

const SELECT_SINCE: &str = "SELECT * FROM changes WHERE id > ? ORDER BY id ASC";
const SELECT_CLASSIFIED: &str = "\
    SELECT c.*, sc.important FROM scheduler_changes sc \
    JOIN changes c ON c.id = sc.change_id \
    WHERE sc.scheduler = ? ORDER BY c.id ASC";

fn classified_from_rows(rows: Vec<SqliteRow>) -> StoreResult<ClassifiedChanges> {
    let mut out = ClassifiedChanges::default();
    for row in rows {
        let important: bool = row.get("important");
        let change = change_from_row(&row)?;
        if important {
            out.important.push(change);
        } else {
            out.unimportant.push(change);
        }
    }
    Ok(out)
}

fn state_from_row(row: Option<SqliteRow>) -> StoreResult<SchedulerState> {
    match row {
        Some(row) => {
            let record: serde_json::Value = serde_json::from_str(&row.get::<String, _>("state"))?;
            Ok(SchedulerState::from_record(&record))
        }
        None => Ok(SchedulerState::absent()),
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn add_change(&self, new: NewChange) -> StoreResult<Change> {
        let now = Utc::now();
        let when = new.clamped_when(now);
        let files = serde_json::to_string(&new.files)?;
        let links = serde_json::to_string(&new.links)?;
        let properties = serde_json::to_string(&new.properties)?;
        let row = sqlx::query(
            "INSERT INTO changes \
             (who, files, comments, is_dir, links, revision, revlink, when_ts, \
              branch, category, properties, repository, project) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new.who)
        .bind(files)
        .bind(&new.comments)
        .bind(new.is_dir)
        .bind(links)
        .bind(&new.revision)
        .bind(&new.revlink)
        .bind(when)
        .bind(&new.branch)
        .bind(&new.category)
        .bind(properties)
        .bind(&new.repository)
        .bind(&new.project)
        .fetch_one(&self.pool)
        .await?;
        let id: i64 = row.get("id");
        Ok(Change {
            id: ChangeId::new(id),
            who: new.who,
            files: new.files,
            comments: new.comments,
            is_dir: new.is_dir,
            links: new.links,
            revision: new.revision,
            revlink: new.revlink,
            when,
            branch: new.branch,
            category: new.category,
            properties: new.properties,
            repository: new.repository,
            project: new.project,
        })
    }

    async fn get_change(&self, id: ChangeId) -> StoreResult<Option<Change>> {
        let row = sqlx::query("SELECT * FROM changes WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(change_from_row).transpose()
    }

    async fn latest_change_id(&self) -> StoreResult<Option<ChangeId>> {
        let row = sqlx::query("SELECT MAX(id) AS id FROM changes")
            .fetch_one(&self.pool)
            .await?;
        let id: Option<i64> = row.get("id");
        Ok(id.map(ChangeId::new))
    }

    async fn changes_since(&self, last: ChangeId) -> StoreResult<Vec<Change>> {
        let rows = sqlx::query(SELECT_SINCE)
            .bind(last.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(change_from_row).collect()
    }

    async fn get_state(&self, scheduler: &str) -> StoreResult<SchedulerState> {
        let row = sqlx::query("SELECT state FROM scheduler_state WHERE scheduler = ?")
            .bind(scheduler)
            .fetch_optional(&self.pool)
            .await?;
        state_from_row(row)
    }

    async fn get_classified(&self, scheduler: &str) -> StoreResult<ClassifiedChanges> {
        let rows = sqlx::query(SELECT_CLASSIFIED)
            .bind(scheduler)
            .fetch_all(&self.pool)
            .await?;
        classified_from_rows(rows)
    }

    async fn buildrequests(&self) -> StoreResult<Vec<BuildRequest>> {
        let rows = sqlx::query("SELECT * FROM buildrequests ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(request_from_row).collect())
    }

    async fn get_sourcestamp(&self, id: SourceStampId) -> StoreResult<Option<SourceStamp>> {
        let row = sqlx::query("SELECT * FROM sourcestamps WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let change_ids: Vec<ChangeId> =
                    serde_json::from_str(&row.get::<String, _>("change_ids"))?;
                Ok(Some(SourceStamp {
                    id,
                    branch: row.get("branch"),
                    revision: row.get("revision"),
                    change_ids,
                }))
            }
            None => Ok(None),
        }
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

/// One sqlx transaction; rolled back on drop unless committed.
struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn get_state(&mut self, scheduler: &str) -> StoreResult<SchedulerState> {
        let row = sqlx::query("SELECT state FROM scheduler_state WHERE scheduler = ?")
            .bind(scheduler)
            .fetch_optional(&mut *self.tx)
            .await?;
        state_from_row(row)
    }

    async fn set_state(&mut self, scheduler: &str, state: SchedulerState) -> StoreResult<()> {
        let record = state.to_record().to_string();
        sqlx::query(
            "INSERT INTO scheduler_state (scheduler, state) VALUES (?, ?) \
             ON CONFLICT(scheduler) DO UPDATE SET state = excluded.state",
        )
        .bind(scheduler)
        .bind(record)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn changes_since(&mut self, last: ChangeId) -> StoreResult<Vec<Change>> {
        let rows = sqlx::query(SELECT_SINCE)
            .bind(last.as_i64())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(change_from_row).collect()
    }

    async fn get_classified(&mut self, scheduler: &str) -> StoreResult<ClassifiedChanges> {
        let rows = sqlx::query(SELECT_CLASSIFIED)
            .bind(scheduler)
            .fetch_all(&mut *self.tx)
            .await?;
        classified_from_rows(rows)
    }

    async fn classify(
        &mut self,
        scheduler: &str,
        change: ChangeId,
        important: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO scheduler_changes (scheduler, change_id, important) VALUES (?, ?, ?) \
             ON CONFLICT(scheduler, change_id) DO UPDATE SET important = excluded.important",
        )
        .bind(scheduler)
        .bind(change.as_i64())
        .bind(important)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn retire(&mut self, scheduler: &str, ids: &[ChangeId]) -> StoreResult<()> {
        for id in ids {
            sqlx::query("DELETE FROM scheduler_changes WHERE scheduler = ? AND change_id = ?")
                .bind(scheduler)
                .bind(id.as_i64())
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn insert_sourcestamp(&mut self, new: NewSourceStamp) -> StoreResult<SourceStampId> {
        let change_ids = serde_json::to_string(&new.change_ids)?;
        let row = sqlx::query(
            "INSERT INTO sourcestamps (branch, revision, change_ids) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&new.branch)
        .bind(&new.revision)
        .bind(change_ids)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(SourceStampId::new(row.get("id")))
    }

    async fn insert_buildset(
        &mut self,
        sourcestamp: SourceStampId,
        reason: &str,
    ) -> StoreResult<BuildSetId> {
        let row = sqlx::query(
            "INSERT INTO buildsets (sourcestamp_id, reason, submitted_at) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(sourcestamp.as_i64())
        .bind(reason)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(BuildSetId::new(row.get("id")))
    }

    async fn insert_buildrequest(
        &mut self,
        buildset: BuildSetId,
        builder_name: &str,
        priority: i32,
    ) -> StoreResult<BuildRequestId> {
        let row = sqlx::query(
            "INSERT INTO buildrequests (buildset_id, builder_name, priority, submitted_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(buildset.as_i64())
        .bind(builder_name)
        .bind(priority)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(BuildRequestId::new(row.get("id")))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
