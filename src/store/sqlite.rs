//! SQLite-based execution store

use crate::core::{
    Ambiance, InterruptEffect, NodeExecution, PlanExecution, PlanStatus, Status,
    SweepingOutputInstance,
};
use crate::store::{ExecutionStore, StoreError, StoreResult};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}", db_path))
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> anyhow::Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("planrun");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("executions.db");
        Self::new(db_path.to_str().unwrap()).await
    }

    /// Initialize database schema
    async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plan_executions (
                id TEXT PRIMARY KEY,
                plan_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_plan_status ON plan_executions(status);
            CREATE INDEX IF NOT EXISTS idx_plan_started_at ON plan_executions(started_at);

            CREATE TABLE IF NOT EXISTS node_executions (
                id TEXT PRIMARY KEY,
                plan_execution_id TEXT NOT NULL,
                parent_id TEXT,
                position INTEGER NOT NULL DEFAULT 0,
                setup_id TEXT NOT NULL,
                name TEXT NOT NULL,
                step_type TEXT NOT NULL,
                status TEXT NOT NULL,
                ambiance TEXT NOT NULL,
                interrupt_history TEXT NOT NULL,
                output_ids TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 0,
                parameters TEXT NOT NULL,
                timeout_secs INTEGER,
                started_at TEXT,
                ended_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_node_parent ON node_executions(parent_id);
            CREATE INDEX IF NOT EXISTS idx_node_plan_status
                ON node_executions(plan_execution_id, status);

            CREATE TABLE IF NOT EXISTS sweeping_outputs (
                id TEXT PRIMARY KEY,
                plan_execution_id TEXT NOT NULL,
                name TEXT NOT NULL,
                levels TEXT NOT NULL,
                level_index TEXT NOT NULL,
                value TEXT NOT NULL,
                published_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_output_scope
                ON sweeping_outputs(plan_execution_id, name, level_index);
            CREATE INDEX IF NOT EXISTS idx_output_name
                ON sweeping_outputs(plan_execution_id, name);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn plan_from_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<PlanExecution> {
        let status_tag: String = row.get("status");
        Ok(PlanExecution {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            plan_name: row.get("plan_name"),
            status: PlanStatus::parse(&status_tag)
                .ok_or_else(|| anyhow!("unknown plan status tag '{}'", status_tag))?,
            started_at: Self::from_naive(row.get("started_at")),
            ended_at: row
                .get::<Option<NaiveDateTime>, _>("ended_at")
                .map(Self::from_naive),
        })
    }

    fn node_from_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<NodeExecution> {
        let status_tag: String = row.get("status");
        let ambiance: Ambiance = serde_json::from_str(&row.get::<String, _>("ambiance"))?;
        let interrupt_history: Vec<InterruptEffect> =
            serde_json::from_str(&row.get::<String, _>("interrupt_history"))?;
        let output_ids: Vec<Uuid> = serde_json::from_str(&row.get::<String, _>("output_ids"))?;
        let parameters: serde_json::Value =
            serde_json::from_str(&row.get::<String, _>("parameters"))?;

        Ok(NodeExecution {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            plan_execution_id: Uuid::parse_str(&row.get::<String, _>("plan_execution_id"))?,
            parent_id: row
                .get::<Option<String>, _>("parent_id")
                .map(|s| Uuid::parse_str(&s))
                .transpose()?,
            position: row.get::<i64, _>("position") as usize,
            setup_id: row.get("setup_id"),
            name: row.get("name"),
            step_type: row.get("step_type"),
            status: Status::parse(&status_tag)
                .ok_or_else(|| anyhow!("unknown node status tag '{}'", status_tag))?,
            ambiance,
            interrupt_history,
            output_ids,
            attempts: row.get::<i64, _>("attempts") as usize,
            max_retries: row.get::<i64, _>("max_retries") as usize,
            parameters,
            timeout_secs: row
                .get::<Option<i64>, _>("timeout_secs")
                .map(|secs| secs as u64),
            started_at: row
                .get::<Option<NaiveDateTime>, _>("started_at")
                .map(Self::from_naive),
            ended_at: row
                .get::<Option<NaiveDateTime>, _>("ended_at")
                .map(Self::from_naive),
        })
    }

    fn output_from_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<SweepingOutputInstance> {
        Ok(SweepingOutputInstance {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            plan_execution_id: Uuid::parse_str(&row.get::<String, _>("plan_execution_id"))?,
            name: row.get("name"),
            levels: serde_json::from_str(&row.get::<String, _>("levels"))?,
            level_index: row.get("level_index"),
            value: serde_json::from_str(&row.get::<String, _>("value"))?,
            published_at: Self::from_naive(row.get("published_at")),
        })
    }

    async fn write_node(&self, node: &NodeExecution) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO node_executions
            (id, plan_execution_id, parent_id, position, setup_id, name, step_type,
             status, ambiance, interrupt_history, output_ids, attempts, max_retries,
             parameters, timeout_secs, started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(node.id.to_string())
        .bind(node.plan_execution_id.to_string())
        .bind(node.parent_id.map(|id| id.to_string()))
        .bind(node.position as i64)
        .bind(&node.setup_id)
        .bind(&node.name)
        .bind(&node.step_type)
        .bind(node.status.as_str())
        .bind(serde_json::to_string(&node.ambiance).map_err(anyhow::Error::from)?)
        .bind(serde_json::to_string(&node.interrupt_history).map_err(anyhow::Error::from)?)
        .bind(serde_json::to_string(&node.output_ids).map_err(anyhow::Error::from)?)
        .bind(node.attempts as i64)
        .bind(node.max_retries as i64)
        .bind(serde_json::to_string(&node.parameters).map_err(anyhow::Error::from)?)
        .bind(node.timeout_secs.map(|secs| secs as i64))
        .bind(node.started_at.map(Self::to_naive))
        .bind(node.ended_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to save node execution")?;

        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn insert_plan(&self, plan: &PlanExecution) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO plan_executions (id, plan_name, status, started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(plan.id.to_string())
        .bind(&plan.plan_name)
        .bind(plan.status.as_str())
        .bind(Self::to_naive(plan.started_at))
        .bind(plan.ended_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to save plan execution")?;

        Ok(())
    }

    async fn load_plan(&self, id: Uuid) -> StoreResult<PlanExecution> {
        let row = sqlx::query("SELECT * FROM plan_executions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load plan execution")?;

        match row {
            Some(row) => Ok(Self::plan_from_row(&row)?),
            None => Err(StoreError::NotFound { kind: "plan", id }),
        }
    }

    async fn update_plan_status(
        &self,
        id: Uuid,
        status: PlanStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE plan_executions SET status = ?2, ended_at = COALESCE(?3, ended_at) WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(ended_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to update plan status")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "plan", id });
        }
        Ok(())
    }

    async fn list_plans(&self) -> StoreResult<Vec<PlanExecution>> {
        let rows = sqlx::query("SELECT * FROM plan_executions ORDER BY started_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list plan executions")?;

        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            plans.push(Self::plan_from_row(row)?);
        }
        Ok(plans)
    }

    async fn insert_node(&self, node: &NodeExecution) -> StoreResult<()> {
        self.write_node(node).await
    }

    async fn load_node(&self, id: Uuid) -> StoreResult<NodeExecution> {
        let row = sqlx::query("SELECT * FROM node_executions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load node execution")?;

        match row {
            Some(row) => Ok(Self::node_from_row(&row)?),
            None => Err(StoreError::NotFound { kind: "node", id }),
        }
    }

    async fn update_node(&self, node: &NodeExecution) -> StoreResult<()> {
        self.write_node(node).await
    }

    async fn transition_node(
        &self,
        id: Uuid,
        status: Status,
        effect: Option<InterruptEffect>,
    ) -> StoreResult<NodeExecution> {
        // Read-modify-write inside one transaction: the single-document
        // atomicity the contract requires.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let row = sqlx::query("SELECT * FROM node_executions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load node execution")?;

        let mut node = match row {
            Some(row) => Self::node_from_row(&row)?,
            None => return Err(StoreError::NotFound { kind: "node", id }),
        };

        node.status = status;
        if status.is_terminal() && node.ended_at.is_none() {
            node.ended_at = Some(Utc::now());
        }
        if let Some(effect) = effect {
            node.interrupt_history.push(effect);
        }

        sqlx::query(
            r#"
            UPDATE node_executions
            SET status = ?2, interrupt_history = ?3, ended_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(node.status.as_str())
        .bind(serde_json::to_string(&node.interrupt_history).map_err(anyhow::Error::from)?)
        .bind(node.ended_at.map(Self::to_naive))
        .execute(&mut *tx)
        .await
        .context("Failed to transition node execution")?;

        tx.commit().await.context("Failed to commit transition")?;

        Ok(node)
    }

    async fn children_of(&self, parent_id: Uuid) -> StoreResult<Vec<NodeExecution>> {
        let rows = sqlx::query("SELECT * FROM node_executions WHERE parent_id = ?1")
            .bind(parent_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to query children")?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(Self::node_from_row(row)?);
        }
        Ok(nodes)
    }

    async fn roots_of_plan(&self, plan_id: Uuid) -> StoreResult<Vec<NodeExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM node_executions WHERE plan_execution_id = ?1 AND parent_id IS NULL",
        )
        .bind(plan_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query root nodes")?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(Self::node_from_row(row)?);
        }
        Ok(nodes)
    }

    async fn nodes_by_status(
        &self,
        plan_id: Uuid,
        status: Status,
    ) -> StoreResult<Vec<NodeExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM node_executions WHERE plan_execution_id = ?1 AND status = ?2",
        )
        .bind(plan_id.to_string())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query nodes by status")?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(Self::node_from_row(row)?);
        }
        Ok(nodes)
    }

    async fn nodes_of_plan(&self, plan_id: Uuid) -> StoreResult<Vec<NodeExecution>> {
        let rows = sqlx::query("SELECT * FROM node_executions WHERE plan_execution_id = ?1")
            .bind(plan_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to query plan nodes")?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(Self::node_from_row(row)?);
        }
        Ok(nodes)
    }

    async fn insert_output(&self, record: &SweepingOutputInstance) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO sweeping_outputs
            (id, plan_execution_id, name, levels, level_index, value, published_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.plan_execution_id.to_string())
        .bind(&record.name)
        .bind(serde_json::to_string(&record.levels).map_err(anyhow::Error::from)?)
        .bind(&record.level_index)
        .bind(serde_json::to_string(&record.value).map_err(anyhow::Error::from)?)
        .bind(Self::to_naive(record.published_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateOutput {
                    name: record.name.clone(),
                    scope: record.level_index.clone(),
                })
            }
            Err(e) => Err(StoreError::Backend(
                anyhow::Error::new(e).context("Failed to insert sweeping output"),
            )),
        }
    }

    async fn outputs_named(
        &self,
        plan_id: Uuid,
        name: &str,
    ) -> StoreResult<Vec<SweepingOutputInstance>> {
        let rows = sqlx::query(
            "SELECT * FROM sweeping_outputs WHERE plan_execution_id = ?1 AND name = ?2",
        )
        .bind(plan_id.to_string())
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query outputs by name")?;

        let mut outputs = Vec::with_capacity(rows.len());
        for row in &rows {
            outputs.push(Self::output_from_row(row)?);
        }
        Ok(outputs)
    }

    async fn prune_plan(&self, plan_id: Uuid) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for table in ["sweeping_outputs", "node_executions"] {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE plan_execution_id = ?1",
                table
            ))
            .bind(plan_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to prune plan records")?;
        }

        sqlx::query("DELETE FROM plan_executions WHERE id = ?1")
            .bind(plan_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to prune plan execution")?;

        tx.commit().await.context("Failed to commit prune")?;
        Ok(())
    }
}
