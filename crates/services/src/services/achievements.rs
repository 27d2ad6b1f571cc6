//! Default achievement catalog and unlock evaluation.

use std::collections::HashSet;

use db::models::{
    achievement::{Achievement, AchievementCondition},
    profile::{Profile, Skill, SkillLevels},
};

use super::progression::level_for_xp;

/// Aggregate state the unlock predicates are evaluated against.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub xp: i64,
    pub level: i64,
    pub tasks_completed: i64,
    pub goals_completed: i64,
    pub skills: SkillLevels,
}

impl ProgressSnapshot {
    pub fn new(profile: &Profile, tasks_completed: i64, goals_completed: i64) -> Self {
        Self {
            xp: profile.xp,
            level: level_for_xp(profile.xp),
            tasks_completed,
            goals_completed,
            skills: profile.skills.clone(),
        }
    }

    fn skill(&self, skill: Skill) -> i64 {
        self.skills.get(&skill).copied().unwrap_or(1)
    }
}

pub fn condition_met(condition: &AchievementCondition, snapshot: &ProgressSnapshot) -> bool {
    match condition {
        AchievementCondition::XpEarned { value } => snapshot.xp >= *value,
        AchievementCondition::LevelReached { value } => snapshot.level >= *value,
        AchievementCondition::TasksCompleted { value } => snapshot.tasks_completed >= *value,
        AchievementCondition::GoalsCompleted { value } => snapshot.goals_completed >= *value,
        AchievementCondition::SkillLevel { skill, value } => snapshot.skill(*skill) >= *value,
        AchievementCondition::AnySkillLevel { value } => {
            Skill::ALL.iter().any(|skill| snapshot.skill(*skill) >= *value)
        }
    }
}

/// Catalog entries whose predicate holds and that are not unlocked yet, in
/// catalog order. Running it again with the returned ids marked unlocked
/// yields nothing.
pub fn evaluate_achievements<'a>(
    catalog: &'a [Achievement],
    snapshot: &ProgressSnapshot,
    already_unlocked: &HashSet<String>,
) -> Vec<&'a Achievement> {
    catalog
        .iter()
        .filter(|a| !already_unlocked.contains(&a.id))
        .filter(|a| condition_met(&a.condition, snapshot))
        .collect()
}

fn entry(
    id: &str,
    name: &str,
    description: &str,
    icon: &str,
    xp_reward: i64,
    category: &str,
    condition: AchievementCondition,
) -> Achievement {
    Achievement {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        icon: icon.to_string(),
        xp_reward,
        condition,
        sort_order: 0,
    }
}

/// Built-in catalog seeded by `POST /achievements/initialize` and at start-up.
pub fn default_catalog() -> Vec<Achievement> {
    use AchievementCondition::*;

    let mut catalog = vec![
        entry("first_steps", "First Steps", "Reach Level 2", "fa-baby", 50, "progression", LevelReached { value: 2 }),
        entry("getting_serious", "Getting Serious", "Reach Level 5", "fa-rocket", 100, "progression", LevelReached { value: 5 }),
        entry("veteran", "Veteran", "Reach Level 10", "fa-medal", 200, "progression", LevelReached { value: 10 }),
        entry("master", "Master", "Reach Level 20", "fa-crown", 500, "progression", LevelReached { value: 20 }),
        entry("getting_started", "Getting Started", "Complete your first task", "fa-check", 25, "tasks", TasksCompleted { value: 1 }),
        entry("task_warrior", "Task Warrior", "Complete 10 tasks", "fa-sword", 75, "tasks", TasksCompleted { value: 10 }),
        entry("quest_master", "Quest Master", "Complete 25 tasks", "fa-trophy", 150, "tasks", TasksCompleted { value: 25 }),
        entry("completionist", "Completionist", "Complete 100 tasks", "fa-star", 500, "tasks", TasksCompleted { value: 100 }),
        entry("experience_seeker", "Experience Seeker", "Earn 500 XP", "fa-gem", 50, "progression", XpEarned { value: 500 }),
        entry("knowledge_hunter", "Knowledge Hunter", "Earn 1000 XP", "fa-brain", 100, "progression", XpEarned { value: 1_000 }),
        entry("wisdom_collector", "Wisdom Collector", "Earn 5000 XP", "fa-scroll", 300, "progression", XpEarned { value: 5_000 }),
        entry("goal_getter", "Goal Getter", "Complete your first goal", "fa-flag", 50, "goals", GoalsCompleted { value: 1 }),
        entry("visionary", "Visionary", "Complete 5 goals", "fa-mountain", 200, "goals", GoalsCompleted { value: 5 }),
        entry("apprentice", "Apprentice", "Raise any skill to level 5", "fa-hammer", 75, "skills", AnySkillLevel { value: 5 }),
        entry("iron_body", "Iron Body", "Raise Strength to level 10", "fa-dumbbell", 150, "skills", SkillLevel { skill: Skill::Strength, value: 10 }),
        entry("sharp_mind", "Sharp Mind", "Raise Focus to level 10", "fa-bullseye", 150, "skills", SkillLevel { skill: Skill::Focus, value: 10 }),
    ];
    for (order, achievement) in catalog.iter_mut().enumerate() {
        achievement.sort_order = order as i64;
    }
    catalog
}
