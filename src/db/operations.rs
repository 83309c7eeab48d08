use sqlx::PgPool;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use crate::db::models::{NewPrompt, Prompt, PromptVersion, PromptWithUsage, UsageRecord, UsageTotals, User};
use crate::error::{AppError, DatabaseError};
use crate::proxy::TokenUsage;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Transaction, Postgres};
use std::time::Duration;
use std::sync::Arc;
use tracing::{debug, info};

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_schema.sql");

const USER_COLUMNS: &str =
    "id, email, name, password_hash, is_paid, usage_tokens, created_at, updated_at";

const PROMPT_COLUMNS: &str =
    "id, user_id, title, content, category, tags, source, summary, created_at, updated_at";

/// Ordering for prompt listings, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptSort {
    Created,
    #[default]
    Updated,
}

impl PromptSort {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("created") => PromptSort::Created,
            _ => PromptSort::Updated,
        }
    }
}

#[derive(Clone)]
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Pool that connects on first use. Handlers that never touch the
    /// database can be exercised without a running server.
    pub fn new_lazy(url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(url)
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        Ok(self.pool.as_ref().begin().await?)
    }

    /// Applies the bundled schema. Every statement is `IF NOT EXISTS`.
    pub async fn initialize_schema(&self) -> Result<(), AppError> {
        let mut applied = 0;
        for statement in schema_statements(SCHEMA_SQL) {
            sqlx::query(&statement).execute(self.pool.as_ref()).await?;
            applied += 1;
        }
        info!("Database schema initialized ({} statements)", applied);
        Ok(())
    }

    pub async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, email, name, password_hash, is_paid, usage_tokens, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.is_paid)
            .bind(user.usage_tokens)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    pub async fn set_user_paid(&self, id: Uuid, is_paid: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET is_paid = $1, updated_at = NOW() WHERE id = $2")
            .bind(is_paid)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    pub async fn list_prompts(
        &self,
        user_id: Uuid,
        tag: Option<&str>,
        sort: PromptSort,
    ) -> Result<Vec<PromptWithUsage>, AppError> {
        let order_by = match sort {
            PromptSort::Created => "p.created_at",
            PromptSort::Updated => "p.updated_at",
        };
        let sql = format!(
            "SELECT p.id, p.user_id, p.title, p.content, p.category, p.tags, p.source, p.summary, \
                    p.created_at, p.updated_at, \
                    COALESCE((SELECT SUM(u.total_tokens) FROM usage u WHERE u.prompt_id = p.id), 0)::BIGINT \
                        AS total_tokens_used \
             FROM prompts p \
             WHERE p.user_id = $1 AND ($2::TEXT IS NULL OR $2 = ANY(p.tags)) \
             ORDER BY {} DESC",
            order_by
        );
        let prompts = sqlx::query_as::<_, PromptWithUsage>(&sql)
            .bind(user_id)
            .bind(tag)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(prompts)
    }

    pub async fn list_prompts_for_export(&self, user_id: Uuid) -> Result<Vec<Prompt>, AppError> {
        let sql = format!(
            "SELECT {} FROM prompts WHERE user_id = $1 ORDER BY created_at ASC",
            PROMPT_COLUMNS
        );
        let prompts = sqlx::query_as::<_, Prompt>(&sql)
            .bind(user_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(prompts)
    }

    pub async fn create_prompt(&self, user_id: Uuid, prompt: &NewPrompt) -> Result<Prompt, AppError> {
        let sql = format!(
            "INSERT INTO prompts (id, user_id, title, content, category, tags, source, summary) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            PROMPT_COLUMNS
        );
        let created = sqlx::query_as::<_, Prompt>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&prompt.title)
            .bind(&prompt.content)
            .bind(&prompt.category)
            .bind(&prompt.tags)
            .bind(prompt.source.as_str())
            .bind(&prompt.summary)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(created)
    }

    /// One insert per item. A failure part-way leaves earlier rows committed.
    pub async fn import_prompts(&self, user_id: Uuid, prompts: &[NewPrompt]) -> Result<Vec<Prompt>, AppError> {
        let mut inserted = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            inserted.push(self.create_prompt(user_id, prompt).await?);
        }
        debug!("Imported {} prompts for user {}", inserted.len(), user_id);
        Ok(inserted)
    }

    pub async fn get_prompt_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<Prompt>, AppError> {
        let sql = format!(
            "SELECT {} FROM prompts WHERE id = $1 AND user_id = $2",
            PROMPT_COLUMNS
        );
        let prompt = sqlx::query_as::<_, Prompt>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(prompt)
    }

    pub async fn update_prompt_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
        prompt: &NewPrompt,
    ) -> Result<Option<Prompt>, AppError> {
        let sql = format!(
            "UPDATE prompts \
             SET title = $3, content = $4, category = $5, tags = $6, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {}",
            PROMPT_COLUMNS
        );
        let updated = sqlx::query_as::<_, Prompt>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(&prompt.title)
            .bind(&prompt.content)
            .bind(&prompt.category)
            .bind(&prompt.tags)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(updated)
    }

    pub async fn delete_prompt_for_user(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM prompts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sums usage rows with `start <= created_at <= end`.
    pub async fn sum_usage_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<UsageTotals, AppError> {
        let totals = sqlx::query_as::<_, UsageTotals>(
            "SELECT COALESCE(SUM(total_tokens), 0)::BIGINT AS total_tokens, \
                    COALESCE(SUM(input_tokens), 0)::BIGINT AS input_tokens, \
                    COALESCE(SUM(output_tokens), 0)::BIGINT AS output_tokens, \
                    COUNT(*) AS request_count \
             FROM usage \
             WHERE user_id = $1 AND created_at >= $2 AND created_at <= $3",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(totals)
    }

    /// Appends a usage row stamped `at` and overwrites the user's running
    /// counter with the recomputed `[start, end]` total, in one transaction.
    pub async fn record_usage(
        &self,
        user_id: Uuid,
        prompt_id: Option<Uuid>,
        usage: TokenUsage,
        at: DateTime<Utc>,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<(UsageRecord, i64), AppError> {
        let mut transaction = self.begin_transaction().await?;

        let result = Self::record_usage_with_transaction(
            &mut transaction, user_id, prompt_id, usage, at, window,
        )
        .await;

        match result {
            Ok(recorded) => {
                transaction.commit().await?;
                Ok(recorded)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }

    async fn record_usage_with_transaction(
        transaction: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        prompt_id: Option<Uuid>,
        usage: TokenUsage,
        at: DateTime<Utc>,
        (start, end): (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<(UsageRecord, i64), AppError> {
        let record = sqlx::query_as::<_, UsageRecord>(
            "INSERT INTO usage (id, user_id, prompt_id, input_tokens, output_tokens, total_tokens, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, prompt_id, input_tokens, output_tokens, total_tokens, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(prompt_id)
        .bind(usage.input_tokens)
        .bind(usage.output_tokens)
        .bind(usage.total_tokens)
        .bind(at)
        .fetch_one(&mut **transaction)
        .await?;

        let month_total = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET usage_tokens = ( \
                 SELECT COALESCE(SUM(total_tokens), 0)::BIGINT FROM usage \
                 WHERE user_id = $1 AND created_at >= $2 AND created_at <= $3 \
             ), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING usage_tokens",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut **transaction)
        .await?;

        Ok((record, month_total))
    }

    /// Snapshots `content` as the next sequential version of a prompt.
    pub async fn create_prompt_version(&self, prompt_id: Uuid, content: &str) -> Result<PromptVersion, AppError> {
        let mut transaction = self.begin_transaction().await?;

        // Row lock serializes concurrent snapshots of one prompt.
        sqlx::query("SELECT id FROM prompts WHERE id = $1 FOR UPDATE")
            .bind(prompt_id)
            .fetch_optional(&mut *transaction)
            .await?
            .ok_or_else(|| AppError::NotFound("Prompt".into()))?;

        let latest = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(version), 0) FROM prompt_versions WHERE prompt_id = $1",
        )
        .bind(prompt_id)
        .fetch_one(&mut *transaction)
        .await?;

        let version = sqlx::query_as::<_, PromptVersion>(
            "INSERT INTO prompt_versions (id, prompt_id, content, version) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, prompt_id, content, version, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(prompt_id)
        .bind(content)
        .bind(latest + 1)
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(version)
    }

    pub async fn list_prompt_versions(&self, prompt_id: Uuid) -> Result<Vec<PromptVersion>, AppError> {
        let versions = sqlx::query_as::<_, PromptVersion>(
            "SELECT id, prompt_id, content, version, created_at FROM prompt_versions \
             WHERE prompt_id = $1 ORDER BY version DESC",
        )
        .bind(prompt_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(versions)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}

/// Splits a SQL script into executable statements, dropping `--` comment lines.
fn schema_statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}
