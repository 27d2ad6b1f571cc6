//! Task and goal completion: the single path through which XP enters a profile.
//!
//! Every mutation takes the profile's lock and runs inside one transaction:
//! mark complete, add XP and store the new level, evaluate achievements,
//! commit. Callers never observe XP without the matching level and unlocks.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use db::models::{
    achievement::Achievement,
    goal::{Goal, GoalResponse, UpdateGoal},
    profile::Profile,
    task::Task,
};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    achievements::{ProgressSnapshot, evaluate_achievements},
    profile_locks::ProfileLocks,
    progression::{self, XpChange},
};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task not found")]
    TaskNotFound,
    #[error("goal not found")]
    GoalNotFound,
    #[error("task already completed")]
    TaskAlreadyCompleted,
    #[error("task is not active")]
    TaskInactive,
    #[error("goal already completed")]
    GoalAlreadyCompleted,
    #[error("progress must be a number between 0 and 1, got {0}")]
    InvalidProgress(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct UnlockedAchievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub xp_reward: i64,
}

impl From<&Achievement> for UnlockedAchievement {
    fn from(achievement: &Achievement) -> Self {
        Self {
            id: achievement.id.clone(),
            name: achievement.name.clone(),
            description: achievement.description.clone(),
            icon: achievement.icon.clone(),
            xp_reward: achievement.xp_reward,
        }
    }
}

/// What a completion did to the profile, returned to the client for notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct EffectSummary {
    pub xp_gained: i64,
    pub level_up: bool,
    pub old_level: i64,
    pub new_level: i64,
    pub skill_bonuses: BTreeMap<String, i64>,
    pub achievements: Vec<UnlockedAchievement>,
    pub total_xp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskCompletion {
    pub task: Task,
    #[serde(flatten)]
    #[ts(flatten)]
    pub effects: EffectSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GoalCompletion {
    pub goal: GoalResponse,
    #[serde(flatten)]
    #[ts(flatten)]
    pub effects: EffectSummary,
}

/// Result of a goal edit; `completion` is set when the edit pushed progress
/// over the completion threshold.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GoalUpdate {
    pub goal: GoalResponse,
    pub completion: Option<EffectSummary>,
}

/// Evaluate the catalog against the profile's current state and record any new
/// unlocks on `conn`. Returns only entries unlocked by this call.
pub(crate) async fn record_new_achievements(
    conn: &mut SqliteConnection,
    profile: &Profile,
    now: DateTime<Utc>,
) -> Result<Vec<UnlockedAchievement>, sqlx::Error> {
    let tasks_completed = Task::count_completed(&mut *conn, profile.id).await?;
    let goals_completed = Goal::count_completed(&mut *conn, profile.id).await?;
    let snapshot = ProgressSnapshot::new(profile, tasks_completed, goals_completed);

    let catalog = Achievement::find_all(&mut *conn).await?;
    let already: HashSet<String> = Achievement::find_unlocked_ids(&mut *conn, profile.id)
        .await?
        .into_iter()
        .collect();

    let mut unlocked = Vec::new();
    for achievement in evaluate_achievements(&catalog, &snapshot, &already) {
        if Achievement::record_unlock(&mut *conn, profile.id, &achievement.id, now).await? {
            info!(
                profile_id = %profile.id,
                achievement_id = %achievement.id,
                "Achievement unlocked"
            );
            unlocked.push(UnlockedAchievement::from(achievement));
        }
    }
    Ok(unlocked)
}

/// Add `gained` XP to the profile, store the derived level, then re-run achievements.
async fn award_xp(
    conn: &mut SqliteConnection,
    profile: &Profile,
    gained: i64,
    now: DateTime<Utc>,
) -> Result<EffectSummary, sqlx::Error> {
    let change = XpChange::apply(profile.xp, gained);
    Profile::set_progress(&mut *conn, profile.id, change.new_xp, change.new_level).await?;

    let updated = Profile {
        xp: change.new_xp,
        level: change.new_level,
        ..profile.clone()
    };
    let achievements = record_new_achievements(conn, &updated, now).await?;

    if change.leveled_up() {
        info!(
            profile_id = %profile.id,
            old_level = change.old_level,
            new_level = change.new_level,
            "Level up"
        );
    }

    Ok(EffectSummary {
        xp_gained: change.new_xp - change.old_xp,
        level_up: change.leveled_up(),
        old_level: change.old_level,
        new_level: change.new_level,
        skill_bonuses: change.skill_bonuses(),
        achievements,
        total_xp: change.new_xp,
    })
}

async fn complete_goal_on(
    conn: &mut SqliteConnection,
    profile: &Profile,
    goal: &Goal,
) -> Result<(Goal, EffectSummary), CompletionError> {
    let now = Utc::now();
    if Goal::mark_completed(&mut *conn, goal.id, now).await? == 0 {
        return Err(CompletionError::GoalAlreadyCompleted);
    }
    let effects = award_xp(conn, profile, progression::goal_award(goal.priority), now).await?;
    let completed = Goal {
        completed: true,
        completed_at: Some(now),
        progress_percent: 100,
        ..goal.clone()
    };
    Ok((completed, effects))
}

#[derive(Clone)]
pub struct CompletionService {
    pool: SqlitePool,
    locks: ProfileLocks,
    goal_completion_threshold: i64,
}

impl CompletionService {
    pub fn new(pool: SqlitePool, locks: ProfileLocks, goal_completion_threshold: i64) -> Self {
        Self {
            pool,
            locks,
            goal_completion_threshold,
        }
    }

    pub async fn complete_task(
        &self,
        profile_id: Uuid,
        task_id: Uuid,
    ) -> Result<TaskCompletion, CompletionError> {
        let _guard = self.locks.lock(profile_id).await;
        let mut tx = self.pool.begin().await?;

        let profile = Profile::find_or_create(&mut tx, profile_id).await?;
        let task = Task::find_by_id(&mut *tx, profile_id, task_id)
            .await?
            .ok_or(CompletionError::TaskNotFound)?;
        if task.completed {
            return Err(CompletionError::TaskAlreadyCompleted);
        }
        if !task.is_active {
            return Err(CompletionError::TaskInactive);
        }

        let linked_goal = match task.goal_id {
            Some(goal_id) => Goal::find_by_id(&mut *tx, profile_id, goal_id).await?,
            None => None,
        };
        let xp = progression::task_award(&task, linked_goal.as_ref());
        debug!(
            task_id = %task.id,
            base_xp = task.xp,
            difficulty = %task.difficulty,
            awarded_xp = xp,
            "Completing task"
        );

        let now = Utc::now();
        if Task::mark_completed(&mut *tx, task.id, now).await? == 0 {
            return Err(CompletionError::TaskAlreadyCompleted);
        }
        let effects = award_xp(&mut tx, &profile, xp, now).await?;
        tx.commit().await?;

        info!(
            profile_id = %profile_id,
            task_id = %task_id,
            xp_gained = effects.xp_gained,
            new_level = effects.new_level,
            "Task completed"
        );

        Ok(TaskCompletion {
            task: Task {
                completed: true,
                completed_at: Some(now),
                updated_at: now,
                ..task
            },
            effects,
        })
    }

    pub async fn complete_goal(
        &self,
        profile_id: Uuid,
        goal_id: Uuid,
    ) -> Result<GoalCompletion, CompletionError> {
        let _guard = self.locks.lock(profile_id).await;
        let mut tx = self.pool.begin().await?;

        let profile = Profile::find_or_create(&mut tx, profile_id).await?;
        let goal = Goal::find_by_id(&mut *tx, profile_id, goal_id)
            .await?
            .ok_or(CompletionError::GoalNotFound)?;
        if goal.completed {
            return Err(CompletionError::GoalAlreadyCompleted);
        }

        let (goal, effects) = complete_goal_on(&mut tx, &profile, &goal).await?;
        tx.commit().await?;

        info!(
            profile_id = %profile_id,
            goal_id = %goal_id,
            xp_gained = effects.xp_gained,
            "Goal completed"
        );

        Ok(GoalCompletion {
            goal: goal.into(),
            effects,
        })
    }

    /// Apply a partial goal edit. Progress reaching the completion threshold
    /// completes the goal in the same transaction.
    pub async fn update_goal(
        &self,
        profile_id: Uuid,
        goal_id: Uuid,
        update: UpdateGoal,
    ) -> Result<GoalUpdate, CompletionError> {
        let progress_percent = match update.progress {
            Some(fraction) => Some(
                progression::progress_percent(fraction)
                    .ok_or(CompletionError::InvalidProgress(fraction))?,
            ),
            None => None,
        };

        let _guard = self.locks.lock(profile_id).await;
        let mut tx = self.pool.begin().await?;

        let existing = Goal::find_by_id(&mut *tx, profile_id, goal_id)
            .await?
            .ok_or(CompletionError::GoalNotFound)?;
        if existing.completed && (progress_percent.is_some() || update.priority.is_some()) {
            return Err(CompletionError::GoalAlreadyCompleted);
        }

        let merged = Goal {
            title: update.title.unwrap_or_else(|| existing.title.clone()),
            description: update.description.unwrap_or_else(|| existing.description.clone()),
            category: update.category.unwrap_or(existing.category),
            priority: update.priority.unwrap_or(existing.priority),
            progress_percent: progress_percent.unwrap_or(existing.progress_percent),
            target_date: update.target_date.or(existing.target_date),
            ..existing
        };
        let mut goal = Goal::update(&mut *tx, &merged).await?;

        let mut completion = None;
        let reached_threshold = progress_percent
            .is_some_and(|percent| percent >= self.goal_completion_threshold);
        if !goal.completed && reached_threshold {
            let profile = Profile::find_or_create(&mut tx, profile_id).await?;
            let (completed, effects) = complete_goal_on(&mut tx, &profile, &goal).await?;
            info!(
                profile_id = %profile_id,
                goal_id = %goal_id,
                progress_percent = merged.progress_percent,
                "Goal completed by progress update"
            );
            goal = completed;
            completion = Some(effects);
        }

        tx.commit().await?;
        Ok(GoalUpdate {
            goal: goal.into(),
            completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            category::Category,
            goal::{CreateGoal, GoalPriority},
            task::{CreateTask, Difficulty},
        },
    };

    use super::*;
    use crate::services::achievements::default_catalog;

    struct Fixture {
        db: DBService,
        service: CompletionService,
        profile_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = DBService::new_in_memory().await.unwrap();
        Achievement::seed(&db.pool, &default_catalog()).await.unwrap();
        let profile_id = Uuid::new_v4();
        let service = CompletionService::new(db.pool.clone(), ProfileLocks::new(), 80);
        Fixture {
            db,
            service,
            profile_id,
        }
    }

    impl Fixture {
        async fn profile(&self) -> Profile {
            let mut conn = self.db.pool.acquire().await.unwrap();
            Profile::find_or_create(&mut conn, self.profile_id).await.unwrap()
        }

        async fn set_xp(&self, xp: i64) {
            self.profile().await;
            Profile::set_progress(&self.db.pool, self.profile_id, xp, progression::level_for_xp(xp))
                .await
                .unwrap();
        }

        async fn task(&self, xp: i64, difficulty: Difficulty, category: Category, goal_id: Option<Uuid>) -> Task {
            self.profile().await;
            let data = CreateTask {
                category: Some(category),
                difficulty: Some(difficulty),
                xp: Some(xp),
                goal_id,
                ..CreateTask::from_title_description("quest".to_string(), None)
            };
            Task::create(&self.db.pool, self.profile_id, &data, Uuid::new_v4())
                .await
                .unwrap()
        }

        async fn goal(&self, priority: GoalPriority, category: Category) -> Goal {
            self.profile().await;
            let data = CreateGoal {
                title: "goal".to_string(),
                description: None,
                category: Some(category),
                priority: Some(priority),
                progress: None,
                target_date: None,
            };
            Goal::create(&self.db.pool, self.profile_id, &data, 0, Uuid::new_v4())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn easy_task_from_zero() {
        let fx = fixture().await;
        let task = fx.task(50, Difficulty::Easy, Category::General, None).await;

        let result = fx.service.complete_task(fx.profile_id, task.id).await.unwrap();
        assert_eq!(result.effects.xp_gained, 50);
        assert_eq!(result.effects.old_level, 1);
        assert_eq!(result.effects.new_level, 2);
        assert!(result.effects.level_up);
        assert!(result.effects.skill_bonuses.is_empty());
        assert!(result.task.completed);

        let names: Vec<_> = result.effects.achievements.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["First Steps", "Getting Started"]);

        let profile = fx.profile().await;
        assert_eq!(profile.xp, 50);
        assert_eq!(profile.level, 2);
    }

    #[tokio::test]
    async fn crossing_a_hundred_grants_a_skill_point() {
        let fx = fixture().await;
        fx.set_xp(95).await;
        let task = fx.task(10, Difficulty::Easy, Category::Work, None).await;

        let result = fx.service.complete_task(fx.profile_id, task.id).await.unwrap();
        assert_eq!(result.effects.total_xp, 105);
        assert_eq!(result.effects.skill_bonuses.get("skill_points"), Some(&1));
    }

    #[tokio::test]
    async fn aligned_goal_bonus_is_applied() {
        let fx = fixture().await;
        let goal = fx.goal(GoalPriority::Critical, Category::Fitness).await;
        let task = fx.task(100, Difficulty::Medium, Category::Fitness, Some(goal.id)).await;

        let result = fx.service.complete_task(fx.profile_id, task.id).await.unwrap();
        assert_eq!(result.effects.xp_gained, 188);
    }

    #[tokio::test]
    async fn completing_twice_is_rejected_without_side_effects() {
        let fx = fixture().await;
        let task = fx.task(30, Difficulty::Hard, Category::Learning, None).await;
        fx.service.complete_task(fx.profile_id, task.id).await.unwrap();
        let before = fx.profile().await;

        let err = fx.service.complete_task(fx.profile_id, task.id).await.unwrap_err();
        assert!(matches!(err, CompletionError::TaskAlreadyCompleted));

        let after = fx.profile().await;
        assert_eq!(after.xp, before.xp);
        assert_eq!(after.level, before.level);
    }

    #[tokio::test]
    async fn inactive_task_cannot_be_completed() {
        let fx = fixture().await;
        let task = fx.task(30, Difficulty::Easy, Category::Social, None).await;
        Task::toggle_active(&fx.db.pool, fx.profile_id, task.id).await.unwrap();

        let err = fx.service.complete_task(fx.profile_id, task.id).await.unwrap_err();
        assert!(matches!(err, CompletionError::TaskInactive));
        assert_eq!(fx.profile().await.xp, 0);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let fx = fixture().await;
        let err = fx.service.complete_task(fx.profile_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CompletionError::TaskNotFound));
    }

    #[tokio::test]
    async fn concurrent_completions_do_not_lose_xp() {
        let fx = fixture().await;
        let first = fx.task(60, Difficulty::Easy, Category::General, None).await;
        let second = fx.task(60, Difficulty::Easy, Category::General, None).await;
        fx.set_xp(40).await;

        let (a, b) = tokio::join!(
            fx.service.complete_task(fx.profile_id, first.id),
            fx.service.complete_task(fx.profile_id, second.id),
        );
        let granted = a.unwrap().effects.skill_bonuses.get("skill_points").copied().unwrap_or(0)
            + b.unwrap().effects.skill_bonuses.get("skill_points").copied().unwrap_or(0);

        assert_eq!(fx.profile().await.xp, 160);
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn goal_completion_awards_once() {
        let fx = fixture().await;
        let goal = fx.goal(GoalPriority::High, Category::Career).await;

        let result = fx.service.complete_goal(fx.profile_id, goal.id).await.unwrap();
        assert_eq!(result.effects.xp_gained, 200);
        assert_eq!(result.effects.new_level, 3);
        assert!(result.goal.completed);
        assert!(result.effects.achievements.iter().any(|a| a.id == "goal_getter"));

        let err = fx.service.complete_goal(fx.profile_id, goal.id).await.unwrap_err();
        assert!(matches!(err, CompletionError::GoalAlreadyCompleted));
        assert_eq!(fx.profile().await.xp, 200);
    }

    #[tokio::test]
    async fn progress_update_past_threshold_completes_goal() {
        let fx = fixture().await;
        let goal = fx.goal(GoalPriority::Low, Category::Health).await;

        let partial = fx
            .service
            .update_goal(fx.profile_id, goal.id, UpdateGoal { progress: Some(0.5), ..Default::default() })
            .await
            .unwrap();
        assert!(partial.completion.is_none());
        assert_eq!(partial.goal.progress_percent, 50);

        let done = fx
            .service
            .update_goal(fx.profile_id, goal.id, UpdateGoal { progress: Some(0.8), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(done.completion.map(|c| c.xp_gained), Some(100));
        assert!(done.goal.completed);

        let err = fx
            .service
            .update_goal(fx.profile_id, goal.id, UpdateGoal { priority: Some(GoalPriority::Critical), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::GoalAlreadyCompleted));
    }

    #[tokio::test]
    async fn progress_just_below_threshold_does_not_complete() {
        let fx = fixture().await;
        let goal = fx.goal(GoalPriority::Medium, Category::Career).await;

        for progress in [0.795, 0.7951, 0.79999] {
            let update = fx
                .service
                .update_goal(fx.profile_id, goal.id, UpdateGoal { progress: Some(progress), ..Default::default() })
                .await
                .unwrap();
            assert!(update.completion.is_none(), "{progress} completed the goal");
            assert!(!update.goal.completed);
            assert_eq!(update.goal.progress_percent, 79);
        }
        assert_eq!(fx.profile().await.xp, 0);
    }

    #[tokio::test]
    async fn description_can_be_cleared() {
        let fx = fixture().await;
        let goal = fx.goal(GoalPriority::Low, Category::Learning).await;
        fx.service
            .update_goal(fx.profile_id, goal.id, UpdateGoal { description: Some(Some("Read daily".to_string())), ..Default::default() })
            .await
            .unwrap();

        let cleared = fx
            .service
            .update_goal(fx.profile_id, goal.id, UpdateGoal { description: Some(None), ..Default::default() })
            .await
            .unwrap();
        assert!(cleared.goal.description.is_none());
    }

    #[tokio::test]
    async fn negative_progress_is_rejected() {
        let fx = fixture().await;
        let goal = fx.goal(GoalPriority::Medium, Category::Learning).await;
        let err = fx
            .service
            .update_goal(fx.profile_id, goal.id, UpdateGoal { progress: Some(-0.2), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::InvalidProgress(_)));
    }
}
