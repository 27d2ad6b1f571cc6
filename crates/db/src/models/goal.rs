use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::category::Category;

#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sqlx(type_name = "goal_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GoalPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Goal {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub priority: GoalPriority,
    pub progress_percent: i64, // 0..=100, integer to keep threshold checks exact
    pub target_date: Option<NaiveDate>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire form of a goal: the stored row plus `progress` as a 0.0..=1.0 fraction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GoalResponse {
    #[serde(flatten)]
    #[ts(flatten)]
    pub goal: Goal,
    pub progress: f64,
}

impl From<Goal> for GoalResponse {
    fn from(goal: Goal) -> Self {
        let progress = goal.progress_percent as f64 / 100.0;
        Self { goal, progress }
    }
}

impl std::ops::Deref for GoalResponse {
    type Target = Goal;
    fn deref(&self) -> &Self::Target {
        &self.goal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateGoal {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<GoalPriority>,
    /// Fraction 0.0..=1.0
    pub progress: Option<f64>,
    pub target_date: Option<NaiveDate>,
}

/// Partial update. An explicit `null` description clears it.
#[derive(Debug, Default, Serialize, Deserialize, TS)]
pub struct UpdateGoal {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(type = "string | null")]
    pub description: Option<Option<String>>,
    pub category: Option<Category>,
    pub priority: Option<GoalPriority>,
    /// Fraction 0.0..=1.0
    pub progress: Option<f64>,
    pub target_date: Option<NaiveDate>,
}

/// Body of the progress-only update
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
pub struct GoalProgress {
    /// Fraction 0.0..=1.0
    pub progress: f64,
}

impl From<GoalProgress> for UpdateGoal {
    fn from(value: GoalProgress) -> Self {
        Self {
            progress: Some(value.progress),
            ..Default::default()
        }
    }
}

const GOAL_COLUMNS: &str = "id, profile_id, title, description, category, priority, progress_percent, target_date, completed, completed_at, created_at, updated_at";

impl Goal {
    pub async fn find_by_profile_id(
        pool: &SqlitePool,
        profile_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        // Highest priority first; the priority column is text so rank it explicitly
        sqlx::query_as::<_, Goal>(&format!(
            r#"SELECT {GOAL_COLUMNS} FROM goals
               WHERE profile_id = $1
               ORDER BY completed ASC,
                        CASE priority
                            WHEN 'critical' THEN 0
                            WHEN 'high' THEN 1
                            WHEN 'medium' THEN 2
                            ELSE 3
                        END,
                        created_at DESC"#
        ))
        .bind(profile_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id<'e, E>(
        executor: E,
        profile_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Goal>(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE id = $1 AND profile_id = $2"
        ))
        .bind(id)
        .bind(profile_id)
        .fetch_optional(executor)
        .await
    }

    /// Most recently created goal with exactly this title
    pub async fn find_latest_by_title<'e, E>(
        executor: E,
        profile_id: Uuid,
        title: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Goal>(&format!(
            r#"SELECT {GOAL_COLUMNS} FROM goals
               WHERE profile_id = $1 AND title = $2
               ORDER BY created_at DESC
               LIMIT 1"#
        ))
        .bind(profile_id)
        .bind(title)
        .fetch_optional(executor)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        profile_id: Uuid,
        data: &CreateGoal,
        progress_percent: i64,
        goal_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Goal>(&format!(
            r#"INSERT INTO goals (id, profile_id, title, description, category, priority, progress_percent, target_date, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
               RETURNING {GOAL_COLUMNS}"#
        ))
        .bind(goal_id)
        .bind(profile_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.category.unwrap_or_default())
        .bind(data.priority.unwrap_or_default())
        .bind(progress_percent)
        .bind(data.target_date)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Persist the editable fields of `goal`
    pub async fn update<'e, E>(executor: E, goal: &Goal) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Goal>(&format!(
            r#"UPDATE goals
               SET title = $3, description = $4, category = $5, priority = $6,
                   progress_percent = $7, target_date = $8, updated_at = $9
               WHERE id = $1 AND profile_id = $2
               RETURNING {GOAL_COLUMNS}"#
        ))
        .bind(goal.id)
        .bind(goal.profile_id)
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(goal.category)
        .bind(goal.priority)
        .bind(goal.progress_percent)
        .bind(goal.target_date)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    /// One-way transition to completed, also pinning progress at 100 %.
    pub async fn mark_completed<'e, E>(
        executor: E,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE goals
               SET completed = 1, completed_at = $2, progress_percent = 100, updated_at = $2
               WHERE id = $1 AND completed = 0"#,
        )
        .bind(id)
        .bind(completed_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_completed<'e, E>(executor: E, profile_id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM goals WHERE profile_id = $1 AND completed = 1",
        )
        .bind(profile_id)
        .fetch_one(executor)
        .await
    }

    pub async fn delete(pool: &SqlitePool, profile_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM goals WHERE id = $1 AND profile_id = $2")
            .bind(id)
            .bind(profile_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
