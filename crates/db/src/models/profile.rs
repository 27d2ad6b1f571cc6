use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::task::Difficulty;

/// Trainable attributes. Every skill starts at level 1 and is raised by
/// spending skill points.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Skill {
    Strength,
    Endurance,
    Agility,
    Focus,
    Memory,
    ProblemSolving,
    Communication,
    Leadership,
    Empathy,
}

impl Skill {
    pub const ALL: [Skill; 9] = [
        Skill::Strength,
        Skill::Endurance,
        Skill::Agility,
        Skill::Focus,
        Skill::Memory,
        Skill::ProblemSolving,
        Skill::Communication,
        Skill::Leadership,
        Skill::Empathy,
    ];
}

pub type SkillLevels = BTreeMap<Skill, i64>;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub xp: i64,
    /// Cached copy of the level derived from `xp`
    pub level: i64,
    pub goals: Option<String>,
    pub focus_areas: Option<String>,
    pub preferred_difficulty: Difficulty,
    #[ts(type = "Record<string, number>")]
    pub skills: SkillLevels,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    name: String,
    xp: i64,
    level: i64,
    goals: Option<String>,
    focus_areas: Option<String>,
    preferred_difficulty: Difficulty,
    strength: i64,
    endurance: i64,
    agility: i64,
    focus: i64,
    memory: i64,
    problem_solving: i64,
    communication: i64,
    leadership: i64,
    empathy: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        let skills = SkillLevels::from([
            (Skill::Strength, row.strength),
            (Skill::Endurance, row.endurance),
            (Skill::Agility, row.agility),
            (Skill::Focus, row.focus),
            (Skill::Memory, row.memory),
            (Skill::ProblemSolving, row.problem_solving),
            (Skill::Communication, row.communication),
            (Skill::Leadership, row.leadership),
            (Skill::Empathy, row.empathy),
        ]);
        Self {
            id: row.id,
            name: row.name,
            xp: row.xp,
            level: row.level,
            goals: row.goals,
            focus_areas: row.focus_areas,
            preferred_difficulty: row.preferred_difficulty,
            skills,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Partial profile update as sent by the client.
#[derive(Debug, Default, Clone, Serialize, Deserialize, TS)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub goals: Option<String>,
    pub focus_areas: Option<String>,
    pub preferred_difficulty: Option<Difficulty>,
    #[ts(type = "Record<string, number> | null")]
    pub skills: Option<SkillLevels>,
}

const PROFILE_COLUMNS: &str = "id, name, xp, level, goals, focus_areas, preferred_difficulty, strength, endurance, agility, focus, memory, problem_solving, communication, leadership, empathy, created_at, updated_at";

impl Profile {
    pub fn skill_level(&self, skill: Skill) -> i64 {
        self.skills.get(&skill).copied().unwrap_or(1)
    }

    /// Points already invested: every level above 1 cost one point.
    /// Saturates instead of wrapping on absurd levels.
    pub fn skill_points_spent(&self) -> i64 {
        Skill::ALL.iter().fold(0i64, |spent, s| {
            spent.saturating_add(self.skill_level(*s).saturating_sub(1))
        })
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(Profile::from))
    }

    /// Fetch the profile, creating a fresh one (XP 0, level 1) on first access.
    pub async fn find_or_create(conn: &mut SqliteConnection, id: Uuid) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO profiles (id, created_at, updated_at) VALUES ($1, $2, $2)",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::find_by_id(&mut *conn, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Store new XP together with the level derived from it
    pub async fn set_progress<'e, E>(
        executor: E,
        id: Uuid,
        xp: i64,
        level: i64,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE profiles SET xp = $2, level = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(xp)
        .bind(level)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Persist name, free-text fields, difficulty preference and skill levels
    pub async fn update_details<'e, E>(executor: E, profile: &Profile) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r#"UPDATE profiles
               SET name = $2, goals = $3, focus_areas = $4, preferred_difficulty = $5,
                   strength = $6, endurance = $7, agility = $8, focus = $9, memory = $10,
                   problem_solving = $11, communication = $12, leadership = $13, empathy = $14,
                   updated_at = $15
               WHERE id = $1
               RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.goals)
        .bind(&profile.focus_areas)
        .bind(profile.preferred_difficulty)
        .bind(profile.skill_level(Skill::Strength))
        .bind(profile.skill_level(Skill::Endurance))
        .bind(profile.skill_level(Skill::Agility))
        .bind(profile.skill_level(Skill::Focus))
        .bind(profile.skill_level(Skill::Memory))
        .bind(profile.skill_level(Skill::ProblemSolving))
        .bind(profile.skill_level(Skill::Communication))
        .bind(profile.skill_level(Skill::Leadership))
        .bind(profile.skill_level(Skill::Empathy))
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let id = Uuid::new_v4();

        let first = Profile::find_or_create(&mut conn, id).await.unwrap();
        assert_eq!(first.xp, 0);
        assert_eq!(first.level, 1);
        assert_eq!(first.skill_points_spent(), 0);
        assert!(first.skills.values().all(|lvl| *lvl == 1));

        Profile::set_progress(&mut *conn, id, 120, 2).await.unwrap();
        let second = Profile::find_or_create(&mut conn, id).await.unwrap();
        assert_eq!(second.xp, 120);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn update_details_persists_skills() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let mut profile = Profile::find_or_create(&mut conn, Uuid::new_v4()).await.unwrap();

        profile.name = "Ranger".to_string();
        profile.skills.insert(Skill::Focus, 3);
        let saved = Profile::update_details(&mut *conn, &profile).await.unwrap();

        assert_eq!(saved.name, "Ranger");
        assert_eq!(saved.skill_level(Skill::Focus), 3);
        assert_eq!(saved.skill_points_spent(), 2);
    }

    #[tokio::test]
    async fn skill_points_spent_saturates() {
        let db = DBService::new_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let mut profile = Profile::find_or_create(&mut conn, Uuid::new_v4()).await.unwrap();

        profile.skills.insert(Skill::Strength, i64::MAX);
        profile.skills.insert(Skill::Focus, i64::MAX);
        assert_eq!(profile.skill_points_spent(), i64::MAX);
    }
}
