use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::category::Category;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "difficulty", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Once,
}

/// Source of task creation
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskSource {
    #[default]
    Manual,
    AiGenerated,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Task {
    pub id: Uuid,
    pub profile_id: Uuid, // Foreign key to Profile
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub difficulty: Difficulty,
    pub frequency: Frequency,
    pub xp: i64, // Base XP before difficulty and goal alignment
    pub goal_id: Option<Uuid>, // Linked goal for the alignment bonus
    pub is_active: bool,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub source: TaskSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub frequency: Option<Frequency>,
    pub xp: Option<i64>,
    pub goal_id: Option<Uuid>,
    pub is_recurring: Option<bool>,
    #[serde(default)]
    pub source: Option<TaskSource>,
}

impl CreateTask {
    pub fn from_title_description(title: String, description: Option<String>) -> Self {
        Self {
            title,
            description,
            category: None,
            difficulty: None,
            frequency: None,
            xp: None,
            goal_id: None,
            is_recurring: None,
            source: None,
        }
    }

    /// Create a task that was produced by the task generator
    pub fn ai_generated(
        title: String,
        description: Option<String>,
        category: Category,
        difficulty: Difficulty,
        frequency: Frequency,
        xp: i64,
    ) -> Self {
        Self {
            title,
            description,
            category: Some(category),
            difficulty: Some(difficulty),
            frequency: Some(frequency),
            xp: Some(xp),
            goal_id: None,
            is_recurring: Some(frequency != Frequency::Once),
            source: Some(TaskSource::AiGenerated),
        }
    }
}

/// Partial update. `description` and `goal_id` distinguish "absent" from an
/// explicit `null` that clears the field.
#[derive(Debug, Default, Serialize, Deserialize, TS)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(type = "string | null")]
    pub description: Option<Option<String>>,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub frequency: Option<Frequency>,
    pub xp: Option<i64>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(type = "string | null")]
    pub goal_id: Option<Option<Uuid>>,
    pub is_recurring: Option<bool>,
}

const TASK_COLUMNS: &str = "id, profile_id, title, description, category, difficulty, frequency, xp, goal_id, is_active, completed, completed_at, is_recurring, source, created_at, updated_at";

impl Task {
    /// Apply a partial update onto a copy of this task
    pub fn merged(&self, update: UpdateTask) -> Task {
        Task {
            title: update.title.unwrap_or_else(|| self.title.clone()),
            description: update.description.unwrap_or_else(|| self.description.clone()),
            category: update.category.unwrap_or(self.category),
            difficulty: update.difficulty.unwrap_or(self.difficulty),
            frequency: update.frequency.unwrap_or(self.frequency),
            xp: update.xp.unwrap_or(self.xp),
            goal_id: update.goal_id.unwrap_or(self.goal_id),
            is_recurring: update.is_recurring.unwrap_or(self.is_recurring),
            ..self.clone()
        }
    }

    pub async fn find_by_profile_id(
        pool: &SqlitePool,
        profile_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE profile_id = $1 ORDER BY created_at DESC"
        ))
        .bind(profile_id)
        .fetch_all(pool)
        .await
    }

    /// Look a task up within one profile. Tasks of other profiles are invisible.
    pub async fn find_by_id<'e, E>(
        executor: E,
        profile_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND profile_id = $2"
        ))
        .bind(id)
        .bind(profile_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        profile_id: Uuid,
        data: &CreateTask,
        task_id: Uuid,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Task>(&format!(
            r#"INSERT INTO tasks (id, profile_id, title, description, category, difficulty, frequency, xp, goal_id, is_recurring, source, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
               RETURNING {TASK_COLUMNS}"#
        ))
        .bind(task_id)
        .bind(profile_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.category.unwrap_or_default())
        .bind(data.difficulty.unwrap_or_default())
        .bind(data.frequency.unwrap_or_default())
        .bind(data.xp.unwrap_or(10))
        .bind(data.goal_id)
        .bind(data.is_recurring.unwrap_or(false))
        .bind(data.source.unwrap_or_default())
        .bind(now)
        .fetch_one(executor)
        .await
    }

    /// Persist the editable fields of `task`
    pub async fn update(pool: &SqlitePool, task: &Task) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            r#"UPDATE tasks
               SET title = $3, description = $4, category = $5, difficulty = $6, frequency = $7,
                   xp = $8, goal_id = $9, is_recurring = $10, updated_at = $11
               WHERE id = $1 AND profile_id = $2
               RETURNING {TASK_COLUMNS}"#
        ))
        .bind(task.id)
        .bind(task.profile_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.category)
        .bind(task.difficulty)
        .bind(task.frequency)
        .bind(task.xp)
        .bind(task.goal_id)
        .bind(task.is_recurring)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn toggle_active(
        pool: &SqlitePool,
        profile_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            r#"UPDATE tasks
               SET is_active = NOT is_active, updated_at = $3
               WHERE id = $1 AND profile_id = $2
               RETURNING {TASK_COLUMNS}"#
        ))
        .bind(id)
        .bind(profile_id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// One-way transition to completed. Matches only an active, not yet
    /// completed row, so a racing second completion affects nothing.
    pub async fn mark_completed<'e, E>(
        executor: E,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"UPDATE tasks
               SET completed = 1, completed_at = $2, updated_at = $2
               WHERE id = $1 AND completed = 0 AND is_active = 1"#,
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
            "SELECT COUNT(*) FROM tasks WHERE profile_id = $1 AND completed = 1",
        )
        .bind(profile_id)
        .fetch_one(executor)
        .await
    }

    /// Creation time of the newest generated task, used for the generation cooldown
    pub async fn latest_ai_generated_at(
        pool: &SqlitePool,
        profile_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"SELECT created_at FROM tasks
               WHERE profile_id = $1 AND source = 'ai_generated'
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(profile_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete<'e, E>(executor: E, profile_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND profile_id = $2")
            .bind(id)
            .bind(profile_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DBService, models::profile::Profile};

    async fn setup() -> (DBService, Uuid) {
        let db = DBService::new_in_memory().await.unwrap();
        let profile_id = Uuid::new_v4();
        let mut conn = db.pool.acquire().await.unwrap();
        Profile::find_or_create(&mut conn, profile_id).await.unwrap();
        (db, profile_id)
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let (db, profile_id) = setup().await;
        let data = CreateTask::from_title_description("Stretch".to_string(), None);
        let task = Task::create(&db.pool, profile_id, &data, Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(task.xp, 10);
        assert_eq!(task.difficulty, Difficulty::Medium);
        assert_eq!(task.category, Category::General);
        assert_eq!(task.source, TaskSource::Manual);
        assert!(task.is_active);
        assert!(!task.completed);
    }

    #[tokio::test]
    async fn mark_completed_only_once_and_only_when_active() {
        let (db, profile_id) = setup().await;
        let data = CreateTask::from_title_description("Read".to_string(), None);
        let task = Task::create(&db.pool, profile_id, &data, Uuid::new_v4())
            .await
            .unwrap();

        Task::toggle_active(&db.pool, profile_id, task.id).await.unwrap();
        assert_eq!(Task::mark_completed(&db.pool, task.id, Utc::now()).await.unwrap(), 0);

        Task::toggle_active(&db.pool, profile_id, task.id).await.unwrap();
        assert_eq!(Task::mark_completed(&db.pool, task.id, Utc::now()).await.unwrap(), 1);
        assert_eq!(Task::mark_completed(&db.pool, task.id, Utc::now()).await.unwrap(), 0);
        assert_eq!(Task::count_completed(&db.pool, profile_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn tasks_are_scoped_to_their_profile() {
        let (db, profile_id) = setup().await;
        let data = CreateTask::from_title_description("Run".to_string(), None);
        let task = Task::create(&db.pool, profile_id, &data, Uuid::new_v4())
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        assert!(Task::find_by_id(&db.pool, stranger, task.id).await.unwrap().is_none());
        assert_eq!(Task::delete(&db.pool, stranger, task.id).await.unwrap(), 0);
        assert_eq!(Task::delete(&db.pool, profile_id, task.id).await.unwrap(), 1);
    }

    #[test]
    fn merged_can_unlink_goal() {
        let update: UpdateTask = serde_json::from_str(r#"{"goal_id": null}"#).unwrap();
        assert_eq!(update.goal_id, Some(None));
        let absent: UpdateTask = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(absent.goal_id, None);
    }

    #[tokio::test]
    async fn merged_can_clear_description() {
        let (db, profile_id) = setup().await;
        let data = CreateTask::from_title_description("Read".to_string(), Some("Two chapters".to_string()));
        let task = Task::create(&db.pool, profile_id, &data, Uuid::new_v4())
            .await
            .unwrap();

        let keep: UpdateTask = serde_json::from_str(r#"{"title": "Read more"}"#).unwrap();
        assert_eq!(task.merged(keep).description.as_deref(), Some("Two chapters"));

        let clear: UpdateTask = serde_json::from_str(r#"{"description": null}"#).unwrap();
        let saved = Task::update(&db.pool, &task.merged(clear)).await.unwrap();
        assert!(saved.description.is_none());
    }
}
