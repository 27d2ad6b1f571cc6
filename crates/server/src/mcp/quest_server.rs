use db::models::{
    category::Category,
    goal::{CreateGoal, Goal, GoalResponse},
    profile::Profile,
    task::{Difficulty, Task},
};
use deployment::Deployment;
use rmcp::{
    ErrorData, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use services::services::profile::ProfileServiceError;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::DeploymentImpl;

/// Number of open quests listed in a status report
const QUEST_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Profile(#[from] ProfileServiceError),
    #[error("{0}")]
    InvalidArgument(&'static str),
    #[error("goal not found: {0}")]
    GoalNotFound(String),
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddGoalRequest {
    #[schemars(description = "Goal title")]
    pub title: String,
    #[schemars(description = "Numeric target for the goal, e.g. an amount to save")]
    pub target: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckProgressRequest {
    #[schemars(description = "Exact goal title")]
    pub title: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GoalSummary {
    pub id: Uuid,
    pub title: String,
    pub category: Category,
    pub target: Option<f64>,
    pub progress: f64,
    pub completed: bool,
}

impl From<Goal> for GoalSummary {
    fn from(goal: Goal) -> Self {
        let target = parse_target(goal.description.as_deref());
        let goal = GoalResponse::from(goal);
        Self {
            id: goal.id,
            title: goal.title.clone(),
            category: goal.category,
            target,
            progress: goal.progress,
            completed: goal.completed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuestSummary {
    pub id: Uuid,
    pub title: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub xp: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub xp: i64,
    pub level: i64,
    /// Fraction of the way to the next level
    pub progress_to_next_level: f64,
    pub skill_points_available: i64,
    pub active_quests_count: usize,
    pub active_goals_count: usize,
    pub active_quests_sample: Vec<QuestSummary>,
    pub active_goals: Vec<GoalSummary>,
}

/// Goals added over MCP keep their numeric target in the description,
/// either as `{"target": n}` or as free text containing `target: n`.
pub fn parse_target(description: Option<&str>) -> Option<f64> {
    let description = description?;
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(description) {
        return value.get("target").and_then(serde_json::Value::as_f64);
    }
    let (_, rest) = description.rsplit_once("target:")?;
    rest.split_whitespace().next()?.parse().ok()
}

/// MCP tools over the quest log of a single profile.
#[derive(Clone)]
pub struct QuestServer {
    deployment: DeploymentImpl,
    profile_id: Uuid,
    tool_router: ToolRouter<QuestServer>,
}

impl QuestServer {
    pub async fn add_goal_with_target(
        &self,
        title: &str,
        target: f64,
    ) -> Result<GoalSummary, ToolError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ToolError::InvalidArgument("title is required"));
        }
        if !target.is_finite() {
            return Err(ToolError::InvalidArgument("target must be a number"));
        }

        let pool = &self.deployment.db().pool;
        let mut conn = pool.acquire().await?;
        Profile::find_or_create(&mut conn, self.profile_id).await?;
        drop(conn);

        let data = CreateGoal {
            title: title.to_string(),
            description: Some(serde_json::json!({ "target": target }).to_string()),
            category: Some(Category::Financial),
            priority: None,
            progress: None,
            target_date: None,
        };
        let goal = Goal::create(pool, self.profile_id, &data, 0, Uuid::new_v4()).await?;
        info!(profile_id = %self.profile_id, goal_id = %goal.id, "Goal added over MCP");
        Ok(goal.into())
    }

    pub async fn progress_report(&self, title: &str) -> Result<GoalSummary, ToolError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ToolError::InvalidArgument("title is required"));
        }
        Goal::find_latest_by_title(&self.deployment.db().pool, self.profile_id, title)
            .await?
            .map(GoalSummary::from)
            .ok_or_else(|| ToolError::GoalNotFound(title.to_string()))
    }

    pub async fn status_report(&self) -> Result<StatusReport, ToolError> {
        let view = self.deployment.profiles().get(self.profile_id).await?;
        let pool = &self.deployment.db().pool;

        let open_quests: Vec<Task> = Task::find_by_profile_id(pool, self.profile_id)
            .await?
            .into_iter()
            .filter(|t| t.is_active && !t.completed)
            .collect();
        let open_goals: Vec<GoalSummary> = Goal::find_by_profile_id(pool, self.profile_id)
            .await?
            .into_iter()
            .filter(|g| !g.completed)
            .map(GoalSummary::from)
            .collect();

        Ok(StatusReport {
            xp: view.profile.xp,
            level: view.profile.level,
            progress_to_next_level: view.level_progress.percent as f64 / 100.0,
            skill_points_available: view.skill_points_available,
            active_quests_count: open_quests.len(),
            active_goals_count: open_goals.len(),
            active_quests_sample: open_quests
                .into_iter()
                .take(QUEST_SAMPLE_SIZE)
                .map(|t| QuestSummary {
                    id: t.id,
                    title: t.title,
                    category: t.category,
                    difficulty: t.difficulty,
                    xp: t.xp,
                })
                .collect(),
            active_goals: open_goals,
        })
    }
}

fn respond<T: Serialize>(result: Result<T, ToolError>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value)
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(err @ (ToolError::Database(_) | ToolError::Profile(ProfileServiceError::Database(_)))) => {
            error!(error = %err, "MCP tool failed");
            Err(ErrorData::internal_error("database error".to_string(), None))
        }
        Err(err) => Ok(CallToolResult::error(vec![Content::text(err.to_string())])),
    }
}

#[tool_router]
impl QuestServer {
    pub fn new(deployment: DeploymentImpl, profile_id: Uuid) -> Self {
        Self {
            deployment,
            profile_id,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Add a goal with a numeric target to the quest log.")]
    async fn add_goal(
        &self,
        Parameters(AddGoalRequest { title, target }): Parameters<AddGoalRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.add_goal_with_target(&title, target).await)
    }

    #[tool(description = "Check current progress (0.0-1.0) toward a goal by its title.")]
    async fn check_progress(
        &self,
        Parameters(CheckProgressRequest { title }): Parameters<CheckProgressRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.progress_report(&title).await)
    }

    #[tool(description = "Summarise XP, level, open quests and open goals.")]
    async fn get_status(&self) -> Result<CallToolResult, ErrorData> {
        respond(self.status_report().await)
    }
}

#[tool_handler]
impl ServerHandler for QuestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Quest log tools. Use 'get_status' for XP and open quests, 'add_goal' to record \
                 a goal with a numeric target and 'check_progress' to read a goal's progress."
                    .to_string(),
            ),
        }
    }
}
