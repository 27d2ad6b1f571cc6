//! Progression engine: leveling curve, skill-point accrual and XP awards.
//!
//! Everything here is pure integer arithmetic. The level curve is quadratic:
//! reaching level `L` requires `50 * (L - 1)^2` cumulative XP, boundary inclusive.

use std::collections::BTreeMap;

use db::models::{
    category::Category,
    goal::{Goal, GoalPriority},
    task::{Difficulty, Task},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

const XP_CURVE_FACTOR: i64 = 50;
pub const XP_PER_SKILL_POINT: i64 = 100;

/// Cap on the goal-alignment bonus, in basis points (50 %).
pub const MAX_ALIGNMENT_BONUS_BP: i64 = 5_000;
const BP: i64 = 10_000;

/// Base reward for completing a goal, scaled by the goal's priority weight.
pub const GOAL_BASE_XP: i64 = 100;
/// Largest base XP a task may carry
pub const MAX_TASK_XP: i64 = 100_000;

/// Level reached with `xp` cumulative experience. Negative input is treated as 0.
pub fn level_for_xp(xp: i64) -> i64 {
    let steps = (xp.max(0) / XP_CURVE_FACTOR) as u64;
    // 50 * k^2 <= xp  <=>  k^2 <= floor(xp / 50)
    steps.isqrt() as i64 + 1
}

/// Cumulative XP at which `level` is reached. Exact inverse of [`level_for_xp`].
pub fn xp_required_for_level(level: i64) -> i64 {
    let steps = level.max(1) - 1;
    XP_CURVE_FACTOR * steps * steps
}

/// Where a profile stands inside its current level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct LevelProgress {
    pub level: i64,
    pub current_level_xp: i64,
    pub next_level_xp: i64,
    pub xp_into_level: i64,
    pub xp_to_next_level: i64,
    /// 0..=100, floored
    pub percent: i64,
}

impl LevelProgress {
    pub fn for_xp(xp: i64) -> Self {
        let xp = xp.max(0);
        let level = level_for_xp(xp);
        let current_level_xp = xp_required_for_level(level);
        let next_level_xp = xp_required_for_level(level + 1);
        let span = next_level_xp - current_level_xp;
        let xp_into_level = xp - current_level_xp;
        Self {
            level,
            current_level_xp,
            next_level_xp,
            xp_into_level,
            xp_to_next_level: next_level_xp - xp,
            percent: xp_into_level * 100 / span,
        }
    }
}

/// Skill points earned over the lifetime of a profile with `xp` cumulative XP.
pub fn skill_points_earned(xp: i64) -> i64 {
    xp.max(0) / XP_PER_SKILL_POINT
}

/// Points granted when XP moves from `old_xp` to `new_xp`. Derived from the
/// cumulative totals so several small awards add up exactly like one large award.
pub fn skill_points_granted(old_xp: i64, new_xp: i64) -> i64 {
    (skill_points_earned(new_xp) - skill_points_earned(old_xp)).max(0)
}

/// Difficulty multiplier in hundredths.
pub fn difficulty_multiplier(difficulty: Difficulty) -> i64 {
    match difficulty {
        Difficulty::Easy => 100,
        Difficulty::Medium => 125,
        Difficulty::Hard => 150,
        Difficulty::Expert => 200,
    }
}

/// Alignment bonus a goal of this priority can give at most, in basis points.
pub fn priority_bonus_bp(priority: GoalPriority) -> i64 {
    match priority {
        GoalPriority::Low => 0,
        GoalPriority::Medium => 1_500,
        GoalPriority::High => 3_000,
        GoalPriority::Critical => 5_000,
    }
}

/// How closely a task category matches a goal category, in percent.
pub fn category_match_percent(task: Category, goal: Category) -> i64 {
    use Category::*;

    if task == goal {
        return 100;
    }
    let related = matches!(
        (task, goal),
        (Fitness, Health)
            | (Health, Fitness)
            | (Work, Career)
            | (Career, Work)
            | (Social, Relationships)
            | (Relationships, Social)
            | (Learning, Career)
            | (Career, Learning)
            | (Personal, Creative)
            | (Creative, Personal)
    );
    if related { 50 } else { 0 }
}

/// Goal-alignment bonus in basis points, capped at [`MAX_ALIGNMENT_BONUS_BP`].
pub fn alignment_bonus_bp(task_category: Category, goal: &Goal) -> i64 {
    let bonus = priority_bonus_bp(goal.priority) * category_match_percent(task_category, goal.category)
        / 100;
    bonus.clamp(0, MAX_ALIGNMENT_BONUS_BP)
}

/// `round_half_up(base * multiplier * (1 + bonus))` in exact integer arithmetic.
pub fn award_xp(base_xp: i64, difficulty: Difficulty, bonus_bp: i64) -> i64 {
    let bonus_bp = bonus_bp.clamp(0, MAX_ALIGNMENT_BONUS_BP);
    let numerator = base_xp.max(0) as i128
        * difficulty_multiplier(difficulty) as i128
        * (BP + bonus_bp) as i128;
    let denominator = 100_i128 * BP as i128;
    i64::try_from((numerator + denominator / 2) / denominator).unwrap_or(i64::MAX)
}

/// XP a task is worth when completed, given its linked goal (if any).
pub fn task_award(task: &Task, linked_goal: Option<&Goal>) -> i64 {
    let bonus_bp = linked_goal
        .map(|goal| alignment_bonus_bp(task.category, goal))
        .unwrap_or(0);
    award_xp(task.xp, task.difficulty, bonus_bp)
}

/// Priority weight for goal rewards, in hundredths.
pub fn goal_priority_weight(priority: GoalPriority) -> i64 {
    match priority {
        GoalPriority::Low => 100,
        GoalPriority::Medium => 150,
        GoalPriority::High => 200,
        GoalPriority::Critical => 300,
    }
}

pub fn goal_award(priority: GoalPriority) -> i64 {
    GOAL_BASE_XP * goal_priority_weight(priority) / 100
}

/// Convert a 0.0..=1.0 progress fraction to the stored integer percent.
/// Rounds down, so a stored percent never overstates progress. Values above
/// 1.0 clamp to 100; negative or non-finite input is rejected.
pub fn progress_percent(fraction: f64) -> Option<i64> {
    if !fraction.is_finite() || fraction < 0.0 {
        return None;
    }
    // epsilon absorbs binary representation error such as 0.29 * 100.0
    Some((fraction.min(1.0) * 100.0 + 1e-9).floor() as i64)
}

/// Outcome of adding XP to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpChange {
    pub old_xp: i64,
    pub new_xp: i64,
    pub old_level: i64,
    pub new_level: i64,
    pub skill_points_granted: i64,
}

impl XpChange {
    pub fn apply(old_xp: i64, gained: i64) -> Self {
        let old_xp = old_xp.max(0);
        let new_xp = old_xp.saturating_add(gained.max(0));
        Self {
            old_xp,
            new_xp,
            old_level: level_for_xp(old_xp),
            new_level: level_for_xp(new_xp),
            skill_points_granted: skill_points_granted(old_xp, new_xp),
        }
    }

    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }

    /// Skill bonus map reported to the client
    pub fn skill_bonuses(&self) -> BTreeMap<String, i64> {
        let mut bonuses = BTreeMap::new();
        if self.skill_points_granted > 0 {
            bonuses.insert("skill_points".to_string(), self.skill_points_granted);
        }
        bonuses
    }
}
