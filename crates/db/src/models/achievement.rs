use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::profile::Skill;

/// Unlock predicate of a catalog entry, evaluated against aggregate profile state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AchievementCondition {
    XpEarned { value: i64 },
    LevelReached { value: i64 },
    TasksCompleted { value: i64 },
    GoalsCompleted { value: i64 },
    SkillLevel { skill: Skill, value: i64 },
    AnySkillLevel { value: i64 },
}

impl AchievementCondition {
    fn columns(&self) -> (&'static str, i64, Option<String>) {
        match self {
            Self::XpEarned { value } => ("xp_earned", *value, None),
            Self::LevelReached { value } => ("level_reached", *value, None),
            Self::TasksCompleted { value } => ("tasks_completed", *value, None),
            Self::GoalsCompleted { value } => ("goals_completed", *value, None),
            Self::SkillLevel { skill, value } => ("skill_level", *value, Some(skill.to_string())),
            Self::AnySkillLevel { value } => ("any_skill_level", *value, None),
        }
    }

    fn from_columns(kind: &str, value: i64, skill: Option<&str>) -> Option<Self> {
        let condition = match kind {
            "xp_earned" => Self::XpEarned { value },
            "level_reached" => Self::LevelReached { value },
            "tasks_completed" => Self::TasksCompleted { value },
            "goals_completed" => Self::GoalsCompleted { value },
            "skill_level" => Self::SkillLevel {
                skill: skill?.parse().ok()?,
                value,
            },
            "any_skill_level" => Self::AnySkillLevel { value },
            _ => return None,
        };
        Some(condition)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub xp_reward: i64,
    pub condition: AchievementCondition,
    pub sort_order: i64,
}

#[derive(Debug, FromRow)]
struct AchievementRow {
    id: String,
    name: String,
    description: String,
    category: String,
    icon: String,
    xp_reward: i64,
    condition_type: String,
    condition_value: i64,
    condition_skill: Option<String>,
    sort_order: i64,
}

impl TryFrom<AchievementRow> for Achievement {
    type Error = sqlx::Error;

    fn try_from(row: AchievementRow) -> Result<Self, Self::Error> {
        let condition = AchievementCondition::from_columns(
            &row.condition_type,
            row.condition_value,
            row.condition_skill.as_deref(),
        )
        .ok_or_else(|| {
            sqlx::Error::Decode(
                format!(
                    "achievement {}: unknown condition {}",
                    row.id, row.condition_type
                )
                .into(),
            )
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            icon: row.icon,
            xp_reward: row.xp_reward,
            condition,
            sort_order: row.sort_order,
        })
    }
}

/// Catalog entry plus the unlock state for one profile
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AchievementWithStatus {
    #[serde(flatten)]
    #[ts(flatten)]
    pub achievement: Achievement,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct CategoryProgress {
    pub total: i64,
    pub unlocked: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AchievementStats {
    pub total: i64,
    pub unlocked: i64,
    /// Unlocked fraction, 0 when the catalog is empty
    pub progress: f64,
    pub categories: BTreeMap<String, CategoryProgress>,
}

impl AchievementStats {
    pub fn from_statuses(statuses: &[AchievementWithStatus]) -> Self {
        let mut categories: BTreeMap<String, CategoryProgress> = BTreeMap::new();
        for status in statuses {
            let entry = categories
                .entry(status.achievement.category.clone())
                .or_default();
            entry.total += 1;
            if status.unlocked {
                entry.unlocked += 1;
            }
        }
        let total = statuses.len() as i64;
        let unlocked = statuses.iter().filter(|s| s.unlocked).count() as i64;
        Self {
            total,
            unlocked,
            progress: if total == 0 {
                0.0
            } else {
                unlocked as f64 / total as f64
            },
            categories,
        }
    }
}

#[derive(Debug, FromRow)]
struct StatusRow {
    #[sqlx(flatten)]
    achievement: AchievementRow,
    unlocked_at: Option<DateTime<Utc>>,
}

const ACHIEVEMENT_COLUMNS: &str = "a.id, a.name, a.description, a.category, a.icon, a.xp_reward, a.condition_type, a.condition_value, a.condition_skill, a.sort_order";

impl Achievement {
    /// Insert catalog entries that are not stored yet. Returns how many were added.
    pub async fn seed(pool: &SqlitePool, catalog: &[Achievement]) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let now = Utc::now();
        let mut inserted = 0;
        for achievement in catalog {
            let (kind, value, skill) = achievement.condition.columns();
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO achievements
                   (id, name, description, category, icon, xp_reward, condition_type, condition_value, condition_skill, sort_order, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
            )
            .bind(&achievement.id)
            .bind(&achievement.name)
            .bind(&achievement.description)
            .bind(&achievement.category)
            .bind(&achievement.icon)
            .bind(achievement.xp_reward)
            .bind(kind)
            .bind(value)
            .bind(skill)
            .bind(achievement.sort_order)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn find_all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, AchievementRow>(&format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements a ORDER BY a.sort_order, a.id"
        ))
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(Achievement::try_from)
        .collect()
    }

    pub async fn find_unlocked_ids<'e, E>(
        executor: E,
        profile_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT achievement_id FROM achievement_unlocks WHERE profile_id = $1",
        )
        .bind(profile_id)
        .fetch_all(executor)
        .await
    }

    /// Record an unlock. Returns false when it was already recorded.
    pub async fn record_unlock<'e, E>(
        executor: E,
        profile_id: Uuid,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO achievement_unlocks (profile_id, achievement_id, unlocked_at)
               VALUES ($1, $2, $3)"#,
        )
        .bind(profile_id)
        .bind(achievement_id)
        .bind(unlocked_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_with_status(
        pool: &SqlitePool,
        profile_id: Uuid,
    ) -> Result<Vec<AchievementWithStatus>, sqlx::Error> {
        sqlx::query_as::<_, StatusRow>(&format!(
            r#"SELECT {ACHIEVEMENT_COLUMNS}, u.unlocked_at
               FROM achievements a
               LEFT JOIN achievement_unlocks u
                 ON u.achievement_id = a.id AND u.profile_id = $1
               ORDER BY a.sort_order, a.id"#
        ))
        .bind(profile_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| -> Result<AchievementWithStatus, sqlx::Error> {
            Ok(AchievementWithStatus {
                achievement: row.achievement.try_into()?,
                unlocked: row.unlocked_at.is_some(),
                unlocked_at: row.unlocked_at,
            })
        })
        .collect()
    }

    /// Unlocked achievements, most recent first
    pub async fn find_unlocked(
        pool: &SqlitePool,
        profile_id: Uuid,
    ) -> Result<Vec<AchievementWithStatus>, sqlx::Error> {
        let mut unlocked: Vec<_> = Self::find_with_status(pool, profile_id)
            .await?
            .into_iter()
            .filter(|s| s.unlocked)
            .collect();
        unlocked.sort_by(|a, b| b.unlocked_at.cmp(&a.unlocked_at));
        Ok(unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DBService, models::profile::Profile};

    fn entry(id: &str, condition: AchievementCondition, sort_order: i64) -> Achievement {
        Achievement {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            category: "tasks".to_string(),
            icon: "fa-check".to_string(),
            xp_reward: 10,
            condition,
            sort_order,
        }
    }

    #[tokio::test]
    async fn seed_skips_existing_entries() {
        let db = DBService::new_in_memory().await.unwrap();
        let catalog = vec![
            entry("first", AchievementCondition::TasksCompleted { value: 1 }, 0),
            entry(
                "strong",
                AchievementCondition::SkillLevel {
                    skill: Skill::Strength,
                    value: 5,
                },
                1,
            ),
        ];

        assert_eq!(Achievement::seed(&db.pool, &catalog).await.unwrap(), 2);
        assert_eq!(Achievement::seed(&db.pool, &catalog).await.unwrap(), 0);

        let stored = Achievement::find_all(&db.pool).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].condition, catalog[1].condition);
    }

    #[tokio::test]
    async fn unlock_is_recorded_once() {
        let db = DBService::new_in_memory().await.unwrap();
        let catalog = vec![entry("first", AchievementCondition::TasksCompleted { value: 1 }, 0)];
        Achievement::seed(&db.pool, &catalog).await.unwrap();

        let profile_id = Uuid::new_v4();
        let mut conn = db.pool.acquire().await.unwrap();
        Profile::find_or_create(&mut conn, profile_id).await.unwrap();
        drop(conn);

        let now = Utc::now();
        assert!(Achievement::record_unlock(&db.pool, profile_id, "first", now).await.unwrap());
        assert!(!Achievement::record_unlock(&db.pool, profile_id, "first", now).await.unwrap());

        let statuses = Achievement::find_with_status(&db.pool, profile_id).await.unwrap();
        assert!(statuses[0].unlocked);
        let stats = AchievementStats::from_statuses(&statuses);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.unlocked, 1);
        assert_eq!(stats.categories["tasks"].unlocked, 1);
    }
}
