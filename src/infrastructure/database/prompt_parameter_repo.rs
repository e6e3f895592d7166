use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::errors::DatabaseError;
use super::utils::{format_datetime, parse_datetime};
use crate::domain::errors::{OptimizationError, OptimizationResult};
use crate::domain::models::PromptParameter;
use crate::domain::ports::PromptParameterRepository;

/// `SQLite` implementation of `PromptParameterRepository`
pub struct SqlitePromptParameterRepository {
    pool: SqlitePool,
}

impl SqlitePromptParameterRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_parameter(row: &SqliteRow) -> Result<PromptParameter, DatabaseError> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(PromptParameter {
        id: Uuid::parse_str(&id)?,
        module_id: row.try_get("module_id")?,
        name: row.try_get("name")?,
        initial_prompt: row.try_get("initial_prompt")?,
        final_prompt: row.try_get("final_prompt")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

#[async_trait]
impl PromptParameterRepository for SqlitePromptParameterRepository {
    async fn insert(&self, parameter: &PromptParameter) -> OptimizationResult<()> {
        sqlx::query(
            r"
            INSERT INTO prompt_parameters (
                id, module_id, name, initial_prompt, final_prompt, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(parameter.id.to_string())
        .bind(&parameter.module_id)
        .bind(&parameter.name)
        .bind(&parameter.initial_prompt)
        .bind(&parameter.final_prompt)
        .bind(format_datetime(&parameter.created_at))
        .bind(format_datetime(&parameter.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OptimizationResult<Option<PromptParameter>> {
        let row = sqlx::query(
            r"
            SELECT id, module_id, name, initial_prompt, final_prompt, created_at, updated_at
            FROM prompt_parameters
            WHERE id = ?
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_parameter).transpose()?)
    }

    async fn list_by_module(&self, module_id: &str) -> OptimizationResult<Vec<PromptParameter>> {
        let rows = sqlx::query(
            r"
            SELECT id, module_id, name, initial_prompt, final_prompt, created_at, updated_at
            FROM prompt_parameters
            WHERE module_id = ?
            ORDER BY name ASC, created_at ASC
            ",
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(row_to_parameter)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn set_final_prompt(&self, id: Uuid, prompt: &str) -> OptimizationResult<()> {
        self.write_final_prompt(id, Some(prompt)).await
    }

    async fn clear_final_prompt(&self, id: Uuid) -> OptimizationResult<()> {
        self.write_final_prompt(id, None).await
    }
}

impl SqlitePromptParameterRepository {
    async fn write_final_prompt(&self, id: Uuid, prompt: Option<&str>) -> OptimizationResult<()> {
        let result = sqlx::query(
            "UPDATE prompt_parameters SET final_prompt = ?, updated_at = ? WHERE id = ?",
        )
        .bind(prompt)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizationError::ParameterNotFound(id));
        }
        Ok(())
    }
}
