use serde::{Deserialize, Serialize};
use sqlx::Type;
use strum_macros::{Display, EnumString};
use ts_rs::TS;

/// Life area a task or goal belongs to. Tasks and goals share one vocabulary so
/// that goal alignment can compare them directly.
#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sqlx(type_name = "category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Work,
    Fitness,
    Learning,
    Social,
    Personal,
    #[default]
    General,
    Creative,
    Health,
    Career,
    Financial,
    Relationships,
}

/// Entry of the static category catalogs served to the client.
#[derive(Debug, Clone, Serialize, TS)]
pub struct CategoryInfo {
    pub id: Category,
    #[ts(type = "string")]
    pub name: &'static str,
    #[ts(type = "string")]
    pub icon: &'static str,
}

const fn info(id: Category, name: &'static str, icon: &'static str) -> CategoryInfo {
    CategoryInfo { id, name, icon }
}

pub const TASK_CATEGORIES: &[CategoryInfo] = &[
    info(Category::Work, "Work & Career", "fas fa-briefcase"),
    info(Category::Fitness, "Fitness", "fas fa-dumbbell"),
    info(Category::Learning, "Learning", "fas fa-book"),
    info(Category::Social, "Social", "fas fa-users"),
    info(Category::Personal, "Personal", "fas fa-user"),
    info(Category::Creative, "Creative", "fas fa-palette"),
    info(Category::Health, "Health", "fas fa-heart"),
    info(Category::General, "General", "fas fa-star"),
];

pub const GOAL_CATEGORIES: &[CategoryInfo] = &[
    info(Category::Career, "Career & Work", "fas fa-briefcase"),
    info(Category::Health, "Health & Fitness", "fas fa-heart"),
    info(Category::Personal, "Personal Development", "fas fa-user-plus"),
    info(Category::Financial, "Financial", "fas fa-dollar-sign"),
    info(Category::Learning, "Learning & Education", "fas fa-graduation-cap"),
    info(Category::Relationships, "Relationships & Social", "fas fa-users"),
];

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn category_round_trips_through_strum() {
        assert_eq!(Category::from_str("problem").ok(), None);
        assert_eq!(Category::from_str("fitness").unwrap(), Category::Fitness);
        assert_eq!(Category::Relationships.to_string(), "relationships");
    }

    #[test]
    fn catalogs_have_unique_ids() {
        for catalog in [TASK_CATEGORIES, GOAL_CATEGORIES] {
            let mut ids: Vec<_> = catalog.iter().map(|c| c.id.to_string()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), catalog.len());
        }
    }
}
