use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::errors::DatabaseError;
use super::utils::{format_datetime, parse_datetime, parse_optional_datetime};
use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::{Generation, OptimizationSession, SessionPage};
use crate::domain::ports::{SessionFilter, SessionRepository};

const SESSION_COLUMNS: &str = "id, user_id, module_id, config, prompt_parameter_ids, status, \
     seed_population, consumed_budget, best_genome, stop_reason, active_run, error, \
     created_at, updated_at, started_at, completed_at";

/// `SQLite` implementation of `SessionRepository`
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_generations(&self, session_id: Uuid) -> Result<Vec<Generation>, DatabaseError> {
        let rows = sqlx::query(
            r"
            SELECT generation_index, individuals, best_fitness, mean_fitness, evaluations, created_at
            FROM optimization_generations
            WHERE session_id = ?
            ORDER BY generation_index ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_generation).collect()
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> OptimizationResult<Vec<OptimizationSession>> {
        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut session = row_to_session(row)?;
            session.generations = self.load_generations(session.id).await?;
            sessions.push(session);
        }
        Ok(sessions)
    }
}

fn row_to_generation(row: &SqliteRow) -> Result<Generation, DatabaseError> {
    let index: i64 = row.try_get("generation_index")?;
    let evaluations: i64 = row.try_get("evaluations")?;
    let individuals: String = row.try_get("individuals")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Generation {
        index: usize::try_from(index)
            .map_err(|_| DatabaseError::ParseError(format!("negative generation index {index}")))?,
        individuals: serde_json::from_str(&individuals)?,
        best_fitness: row.try_get("best_fitness")?,
        mean_fitness: row.try_get("mean_fitness")?,
        evaluations: usize::try_from(evaluations).unwrap_or_default(),
        created_at: parse_datetime(&created_at)?,
    })
}

fn row_to_session(row: &SqliteRow) -> Result<OptimizationSession, DatabaseError> {
    let id: String = row.try_get("id")?;
    let config: String = row.try_get("config")?;
    let parameter_ids: String = row.try_get("prompt_parameter_ids")?;
    let status: String = row.try_get("status")?;
    let seed_population: String = row.try_get("seed_population")?;
    let best_genome: Option<String> = row.try_get("best_genome")?;
    let stop_reason: Option<String> = row.try_get("stop_reason")?;
    let active_run: Option<String> = row.try_get("active_run")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(OptimizationSession {
        id: Uuid::parse_str(&id)?,
        user_id: row.try_get("user_id")?,
        module_id: row.try_get("module_id")?,
        config: serde_json::from_str(&config)?,
        prompt_parameter_ids: serde_json::from_str(&parameter_ids)?,
        status: status
            .parse()
            .map_err(|e: OptimizationError| DatabaseError::ParseError(e.to_string()))?,
        seed_population: serde_json::from_str(&seed_population)?,
        generations: Vec::new(),
        consumed_budget: row.try_get("consumed_budget")?,
        best_genome: best_genome.as_deref().map(serde_json::from_str).transpose()?,
        stop_reason: stop_reason
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: OptimizationError| DatabaseError::ParseError(e.to_string()))?,
        active_run: active_run.as_deref().map(Uuid::parse_str).transpose()?,
        error: row.try_get("error")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
        started_at: parse_optional_datetime(row.try_get("started_at")?)?,
        completed_at: parse_optional_datetime(row.try_get("completed_at")?)?,
    })
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn insert(&self, session: &OptimizationSession) -> OptimizationResult<()> {
        let best_genome = session
            .best_genome
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO optimization_sessions (
                id, user_id, module_id, config, prompt_parameter_ids, status,
                seed_population, consumed_budget, best_genome, stop_reason, active_run, error,
                created_at, updated_at, started_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(session.id.to_string())
        .bind(&session.user_id)
        .bind(&session.module_id)
        .bind(serde_json::to_string(&session.config)?)
        .bind(serde_json::to_string(&session.prompt_parameter_ids)?)
        .bind(session.status.as_str())
        .bind(serde_json::to_string(&session.seed_population)?)
        .bind(session.consumed_budget)
        .bind(best_genome)
        .bind(session.stop_reason.map(|r| r.as_str()))
        .bind(session.active_run.map(|id| id.to_string()))
        .bind(&session.error)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .bind(session.started_at.as_ref().map(format_datetime))
        .bind(session.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool)
        .await?;

        for generation in &session.generations {
            self.append_generation(session.id, generation, session.consumed_budget)
                .await?;
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OptimizationResult<Option<OptimizationSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM optimization_sessions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut session = row_to_session(&row)?;
                session.generations = self.load_generations(id).await?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, session: &OptimizationSession) -> OptimizationResult<()> {
        let best_genome = session
            .best_genome
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r"
            UPDATE optimization_sessions
            SET status = ?, consumed_budget = ?, best_genome = ?, stop_reason = ?,
                active_run = ?, error = ?, updated_at = ?, started_at = ?, completed_at = ?
            WHERE id = ?
            ",
        )
        .bind(session.status.as_str())
        .bind(session.consumed_budget)
        .bind(best_genome)
        .bind(session.stop_reason.map(|r| r.as_str()))
        .bind(session.active_run.map(|id| id.to_string()))
        .bind(&session.error)
        .bind(format_datetime(&session.updated_at))
        .bind(session.started_at.as_ref().map(format_datetime))
        .bind(session.completed_at.as_ref().map(format_datetime))
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizationError::SessionNotFound(session.id));
        }
        Ok(())
    }

    async fn append_generation(
        &self,
        session_id: Uuid,
        generation: &Generation,
        consumed_budget: f64,
    ) -> OptimizationResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = format_datetime(&chrono::Utc::now());

        let result = sqlx::query(
            "UPDATE optimization_sessions SET consumed_budget = ?, updated_at = ? WHERE id = ?",
        )
        .bind(consumed_budget)
        .bind(&now)
        .bind(session_id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(OptimizationError::SessionNotFound(session_id));
        }

        sqlx::query(
            r"
            INSERT INTO optimization_generations (
                session_id, generation_index, individuals, best_fitness, mean_fitness,
                evaluations, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(session_id.to_string())
        .bind(generation.index as i64)
        .bind(serde_json::to_string(&generation.individuals)?)
        .bind(generation.best_fitness)
        .bind(generation.mean_fitness)
        .bind(generation.evaluations as i64)
        .bind(format_datetime(&generation.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> OptimizationResult<SessionPage> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM optimization_sessions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM optimization_sessions
             WHERE user_id = ?
             ORDER BY created_at DESC, id ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(SessionPage {
            items: self.hydrate(rows).await?,
            total: usize::try_from(total).unwrap_or_default(),
            page,
            page_size,
        })
    }

    async fn list(&self, filter: SessionFilter) -> OptimizationResult<Vec<OptimizationSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM optimization_sessions
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR module_id = ?2)
             ORDER BY created_at DESC, id ASC"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.module_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn delete(&self, id: Uuid) -> OptimizationResult<bool> {
        let result = sqlx::query("DELETE FROM optimization_sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
