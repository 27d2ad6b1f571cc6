//! Profile reads and edits, including skill-point allocation.

use chrono::Utc;
use db::models::profile::{Profile, Skill, UpdateProfile};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    completion::{UnlockedAchievement, record_new_achievements},
    profile_locks::ProfileLocks,
    progression::{self, LevelProgress},
};

#[derive(Debug, Error)]
pub enum ProfileServiceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{skill} must be at least level 1, got {level}")]
    InvalidSkillLevel { skill: Skill, level: i64 },
    #[error("not enough skill points: need {needed}, have {available}")]
    InsufficientSkillPoints { needed: i64, available: i64 },
    #[error("name must not be empty")]
    EmptyName,
}

/// Profile as served to clients, with the values derived from XP.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProfileView {
    #[serde(flatten)]
    #[ts(flatten)]
    pub profile: Profile,
    pub level_progress: LevelProgress,
    pub skill_points_available: i64,
}

impl From<Profile> for ProfileView {
    fn from(profile: Profile) -> Self {
        let level_progress = LevelProgress::for_xp(profile.xp);
        let skill_points_available =
            progression::skill_points_earned(profile.xp) - profile.skill_points_spent();
        Self {
            profile,
            level_progress,
            skill_points_available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProfileUpdate {
    pub profile: ProfileView,
    pub achievements: Vec<UnlockedAchievement>,
}

#[derive(Clone)]
pub struct ProfileService {
    pool: SqlitePool,
    locks: ProfileLocks,
}

impl ProfileService {
    pub fn new(pool: SqlitePool, locks: ProfileLocks) -> Self {
        Self { pool, locks }
    }

    /// Fetch (or create) the profile. A cached level that disagrees with the
    /// XP is rewritten before returning.
    pub async fn get(&self, profile_id: Uuid) -> Result<ProfileView, ProfileServiceError> {
        let _guard = self.locks.lock(profile_id).await;
        let mut conn = self.pool.acquire().await?;
        let mut profile = Profile::find_or_create(&mut conn, profile_id).await?;

        let level = progression::level_for_xp(profile.xp);
        if profile.level != level {
            warn!(
                profile_id = %profile_id,
                cached_level = profile.level,
                level,
                "Cached level out of date, repairing"
            );
            Profile::set_progress(&mut *conn, profile_id, profile.xp, level).await?;
            profile.level = level;
        }
        Ok(profile.into())
    }

    pub async fn update(
        &self,
        profile_id: Uuid,
        update: UpdateProfile,
    ) -> Result<ProfileUpdate, ProfileServiceError> {
        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(ProfileServiceError::EmptyName);
        }
        if let Some(skills) = &update.skills {
            if let Some((skill, level)) = skills.iter().find(|(_, level)| **level < 1) {
                return Err(ProfileServiceError::InvalidSkillLevel {
                    skill: *skill,
                    level: *level,
                });
            }
        }

        let _guard = self.locks.lock(profile_id).await;
        let mut tx = self.pool.begin().await?;
        let current = Profile::find_or_create(&mut tx, profile_id).await?;

        let mut next = Profile {
            name: update.name.map(|n| n.trim().to_string()).unwrap_or_else(|| current.name.clone()),
            goals: update.goals.or_else(|| current.goals.clone()),
            focus_areas: update.focus_areas.or_else(|| current.focus_areas.clone()),
            preferred_difficulty: update
                .preferred_difficulty
                .unwrap_or(current.preferred_difficulty),
            ..current.clone()
        };

        let skills_changed = update.skills.is_some();
        if let Some(skills) = update.skills {
            next.skills.extend(skills);
            let needed = next.skill_points_spent();
            let available = progression::skill_points_earned(current.xp);
            if needed > available {
                let spent = current.skill_points_spent();
                return Err(ProfileServiceError::InsufficientSkillPoints {
                    needed: needed.saturating_sub(spent),
                    available: available - spent,
                });
            }
        }

        let saved = Profile::update_details(&mut *tx, &next).await?;
        let achievements = if skills_changed {
            record_new_achievements(&mut tx, &saved, Utc::now()).await?
        } else {
            Vec::new()
        };
        tx.commit().await?;

        info!(
            profile_id = %profile_id,
            skill_points_spent = saved.skill_points_spent(),
            "Profile updated"
        );
        Ok(ProfileUpdate {
            profile: saved.into(),
            achievements,
        })
    }
}
