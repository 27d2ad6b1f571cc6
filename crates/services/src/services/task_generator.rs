//! Turns a profile's goals into suggested tasks via a language model.
//!
//! Model output is untrusted: it is parsed into [`ParseOutcome`], sanitised and
//! clamped before anything is stored. Any failure (transport, timeout, garbage
//! output) falls back to a fixed template set, so generation never errors for
//! reasons outside this service.

use std::{ops::RangeInclusive, str::FromStr, sync::Arc, time::Duration};

use chrono::Utc;
use db::models::{
    category::Category,
    goal::Goal,
    profile::Profile,
    task::{CreateTask, Difficulty, Frequency, Task},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};
use ts_rs::TS;
use utils::text::{squash_whitespace, truncate_chars};
use uuid::Uuid;

use super::{
    config::AiConfig,
    ollama::{GenerateOptions, GenerationRequest, TextGenerator, extract_json_array},
};

pub const MAX_GENERATED_TASKS: usize = 3;
const MAX_TITLE_CHARS: usize = 50;
const MAX_DESCRIPTION_CHARS: usize = 100;
const MAX_GOALS_INPUT_CHARS: usize = 200;
const BASIC_XP: RangeInclusive<i64> = 10..=30;
const BASIC_DEFAULT_XP: i64 = 15;

#[derive(Debug, Error)]
pub enum TaskGeneratorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("tasks were generated recently, retry in {retry_after_secs}s")]
    CooldownActive { retry_after_secs: u64 },
}

/// Model families a caller may ask for. Each maps to one concrete model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelType {
    Fast,
    #[default]
    Balanced,
    Creative,
    Analytical,
}

impl ModelType {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Learning | Category::Work | Category::Career | Category::Financial => {
                ModelType::Analytical
            }
            Category::Personal | Category::Creative => ModelType::Creative,
            _ => ModelType::Balanced,
        }
    }

    /// Concrete model tag; the balanced slot follows the configured default.
    pub fn model_name(self, default_model: &str) -> String {
        match self {
            ModelType::Fast => "llama3.2:1b".to_string(),
            ModelType::Balanced => default_model.to_string(),
            ModelType::Creative => "gemma2:2b".to_string(),
            ModelType::Analytical => "llama3.2:3b".to_string(),
        }
    }
}

pub fn temperature_for(category: Category) -> f32 {
    match category {
        Category::Creative | Category::Personal => 0.8,
        _ => 0.6,
    }
}

/// XP range a generated task of this difficulty is clamped into.
pub fn xp_band(difficulty: Difficulty) -> RangeInclusive<i64> {
    match difficulty {
        Difficulty::Easy => 5..=20,
        Difficulty::Medium => 20..=35,
        Difficulty::Hard => 35..=50,
        Difficulty::Expert => 50..=80,
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, TS)]
pub struct GenerateTasksRequest {
    /// Overrides the goals text stored on the profile
    pub goals: Option<String>,
    pub frequency: Option<Frequency>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, TS)]
pub struct GenerateAdvancedRequest {
    pub goals: Option<String>,
    pub frequency: Option<Frequency>,
    pub category: Option<Category>,
    pub preferred_model_type: Option<ModelType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GeneratedTasks {
    pub tasks: Vec<Task>,
    pub model: String,
    pub used_fallback: bool,
}

/// One task as proposed by the model, before clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedTask {
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub category: Option<Category>,
    pub xp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<ProposedTask>),
    Failed(String),
}

fn enum_field<T: FromStr>(obj: &serde_json::Map<String, Value>, key: &str) -> Option<T> {
    obj.get(key)
        .and_then(Value::as_str)
        .and_then(|s| T::from_str(&s.trim().to_lowercase()).ok())
}

fn proposed_from_value(value: &Value) -> Option<ProposedTask> {
    let obj = value.as_object()?;
    let title = squash_whitespace(obj.get("title")?.as_str()?);
    if title.is_empty() {
        return None;
    }
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(squash_whitespace)
        .filter(|d| !d.is_empty());
    let xp = obj.get("xp").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });

    Some(ProposedTask {
        title,
        description,
        difficulty: enum_field(obj, "difficulty"),
        category: enum_field(obj, "category"),
        xp,
    })
}

/// Strict parse of raw model text. Entries without a usable title are dropped;
/// at most [`MAX_GENERATED_TASKS`] are kept.
pub fn parse_tasks(text: &str) -> ParseOutcome {
    let Some(array) = extract_json_array(text) else {
        return ParseOutcome::Failed("no JSON array in response".to_string());
    };
    let values: Vec<Value> = match serde_json::from_str(array) {
        Ok(values) => values,
        Err(e) => return ParseOutcome::Failed(format!("invalid JSON: {e}")),
    };
    let tasks: Vec<ProposedTask> = values
        .iter()
        .filter_map(proposed_from_value)
        .take(MAX_GENERATED_TASKS)
        .collect();
    if tasks.is_empty() {
        ParseOutcome::Failed("no usable task entries".to_string())
    } else {
        ParseOutcome::Parsed(tasks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Basic,
    Advanced { category: Category },
}

fn finalize(proposed: ProposedTask, mode: Mode, frequency: Frequency) -> CreateTask {
    let title = truncate_chars(&proposed.title, MAX_TITLE_CHARS);
    let description = proposed
        .description
        .map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS));

    let (category, difficulty, xp) = match mode {
        Mode::Basic => (
            proposed.category.unwrap_or_default(),
            proposed.difficulty.unwrap_or_default(),
            proposed
                .xp
                .unwrap_or(BASIC_DEFAULT_XP)
                .clamp(*BASIC_XP.start(), *BASIC_XP.end()),
        ),
        Mode::Advanced { category } => {
            let difficulty = proposed.difficulty.unwrap_or_default();
            let band = xp_band(difficulty);
            let xp = proposed
                .xp
                .unwrap_or(*band.start())
                .clamp(*band.start(), *band.end());
            (proposed.category.unwrap_or(category), difficulty, xp)
        }
    };

    CreateTask::ai_generated(title, description, category, difficulty, frequency, xp)
}

fn fallback_tasks(mode: Mode) -> Vec<ProposedTask> {
    let template = |title: String, description: &str, difficulty, category, xp| ProposedTask {
        title,
        description: Some(description.to_string()),
        difficulty: Some(difficulty),
        category: Some(category),
        xp: Some(xp),
    };
    match mode {
        Mode::Basic => vec![
            template(
                "Daily Progress".to_string(),
                "Make progress on your goals",
                Difficulty::Easy,
                Category::General,
                15,
            ),
            template(
                "Quick Win".to_string(),
                "Complete one small task toward your goal",
                Difficulty::Easy,
                Category::General,
                10,
            ),
        ],
        Mode::Advanced { category } => vec![template(
            format!("Quick {category} session"),
            &format!("Complete a 15-minute {category} activity"),
            Difficulty::Medium,
            category,
            20,
        )],
    }
}

/// Goals text fed to the model: the explicit request text (or the profile's
/// own goals) plus the titles of open goals.
fn goals_context(explicit: Option<&str>, profile: &Profile, goals: &[Goal]) -> String {
    let stated = explicit
        .or(profile.goals.as_deref())
        .map(squash_whitespace)
        .filter(|s| !s.is_empty());
    let mut parts: Vec<String> = stated.into_iter().collect();

    let open: Vec<String> = goals
        .iter()
        .filter(|g| !g.completed)
        .map(|g| format!("{} ({} priority, {})", g.title, g.priority, g.category))
        .collect();
    if !open.is_empty() {
        parts.push(format!("Active goals: {}", open.join("; ")));
    }
    if let Some(focus) = profile.focus_areas.as_deref().filter(|f| !f.trim().is_empty()) {
        parts.push(format!("Focus areas: {}", squash_whitespace(focus)));
    }

    if parts.is_empty() {
        "general self-improvement".to_string()
    } else {
        truncate_chars(&parts.join(". "), MAX_GOALS_INPUT_CHARS)
    }
}

fn compose_prompt(mode: Mode, goals: &str, frequency: Frequency, difficulty: Difficulty) -> String {
    match mode {
        Mode::Basic => format!(
            "Generate {MAX_GENERATED_TASKS} tasks as JSON array for these goals:\n\
             Goals: {goals}\n\
             Frequency: {frequency}\n\
             Preferred difficulty: {difficulty}\n\
             Format: [{{\"title\": \"Task Name\", \"description\": \"Action\", \"frequency\": \"{frequency}\", \"xp\": 20}}]\n\
             Keep titles under {MAX_TITLE_CHARS} chars, descriptions under {MAX_DESCRIPTION_CHARS} chars, xp between 10-30.\n\
             Return only the JSON array."
        ),
        Mode::Advanced { category } => format!(
            "Create {MAX_GENERATED_TASKS} {frequency} tasks for goals: {goals}\n\n\
             Output must be valid JSON only:\n\
             [\n\
             {{\"title\":\"Task Name\",\"description\":\"What to do\",\"difficulty\":\"easy\",\"category\":\"{category}\",\"xp\":15}},\n\
             {{\"title\":\"Second Task\",\"description\":\"What to do\",\"difficulty\":\"medium\",\"category\":\"{category}\",\"xp\":25}},\n\
             {{\"title\":\"Third Task\",\"description\":\"What to do\",\"difficulty\":\"hard\",\"category\":\"{category}\",\"xp\":40}}\n\
             ]\n\n\
             Categories: work, fitness, learning, social, personal, creative, health, general\n\
             XP: easy=5-20, medium=20-35, hard=35-50, expert=50-80\n\
             The user prefers {difficulty} tasks."
        ),
    }
}

struct Plan {
    mode: Mode,
    frequency: Frequency,
    goals: Option<String>,
    model_type: ModelType,
}

#[derive(Clone)]
pub struct TaskGenerator {
    pool: SqlitePool,
    generator: Arc<dyn TextGenerator>,
    config: AiConfig,
}

impl TaskGenerator {
    pub fn new(pool: SqlitePool, generator: Arc<dyn TextGenerator>, config: AiConfig) -> Self {
        Self {
            pool,
            generator,
            config,
        }
    }

    pub async fn generate(
        &self,
        profile_id: Uuid,
        request: GenerateTasksRequest,
    ) -> Result<GeneratedTasks, TaskGeneratorError> {
        let plan = Plan {
            mode: Mode::Basic,
            frequency: request.frequency.unwrap_or_default(),
            goals: request.goals,
            model_type: ModelType::Balanced,
        };
        self.run(profile_id, plan).await
    }

    pub async fn generate_advanced(
        &self,
        profile_id: Uuid,
        request: GenerateAdvancedRequest,
    ) -> Result<GeneratedTasks, TaskGeneratorError> {
        let category = request.category.unwrap_or_default();
        let plan = Plan {
            mode: Mode::Advanced { category },
            frequency: request.frequency.unwrap_or_default(),
            goals: request.goals,
            model_type: request
                .preferred_model_type
                .unwrap_or_else(|| ModelType::for_category(category)),
        };
        self.run(profile_id, plan).await
    }

    async fn check_cooldown(&self, profile_id: Uuid) -> Result<(), TaskGeneratorError> {
        let Some(last) = Task::latest_ai_generated_at(&self.pool, profile_id).await? else {
            return Ok(());
        };
        let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.config.cooldown {
            let remaining = self.config.cooldown - elapsed;
            return Err(TaskGeneratorError::CooldownActive {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }
        Ok(())
    }

    async fn run(&self, profile_id: Uuid, plan: Plan) -> Result<GeneratedTasks, TaskGeneratorError> {
        self.check_cooldown(profile_id).await?;

        let mut conn = self.pool.acquire().await?;
        let profile = Profile::find_or_create(&mut conn, profile_id).await?;
        drop(conn);
        let goals = Goal::find_by_profile_id(&self.pool, profile_id).await?;

        let context = goals_context(plan.goals.as_deref(), &profile, &goals);
        let prompt = compose_prompt(plan.mode, &context, plan.frequency, profile.preferred_difficulty);
        let temperature = match plan.mode {
            Mode::Basic => 0.5,
            Mode::Advanced { category } => temperature_for(category),
        };

        // The fast model is the second attempt; both share one deadline.
        let mut attempts = vec![plan.model_type];
        if matches!(plan.mode, Mode::Advanced { .. }) && plan.model_type != ModelType::Fast {
            attempts.push(ModelType::Fast);
        }
        let deadline = Instant::now() + self.config.timeout;

        let mut accepted = None;
        let mut model = plan.model_type.model_name(&self.config.default_model);
        for model_type in attempts {
            model = model_type.model_name(&self.config.default_model);
            let request = GenerationRequest {
                model: model.clone(),
                prompt: prompt.clone(),
                options: GenerateOptions {
                    temperature,
                    ..GenerateOptions::default()
                },
            };
            let outcome = match timeout_at(deadline, self.generator.generate(&request)).await {
                Ok(Ok(text)) => parse_tasks(&text),
                Ok(Err(e)) => ParseOutcome::Failed(e.to_string()),
                Err(_) => ParseOutcome::Failed("generation timed out".to_string()),
            };
            match outcome {
                ParseOutcome::Parsed(tasks) => {
                    accepted = Some(tasks);
                    break;
                }
                ParseOutcome::Failed(reason) => {
                    warn!(profile_id = %profile_id, model = %model, reason = %reason, "Task generation failed");
                }
            }
        }

        let used_fallback = accepted.is_none();
        let proposals = accepted.unwrap_or_else(|| fallback_tasks(plan.mode));

        let mut tx = self.pool.begin().await?;
        let mut tasks = Vec::with_capacity(proposals.len());
        for proposed in proposals {
            let data = finalize(proposed, plan.mode, plan.frequency);
            tasks.push(Task::create(&mut *tx, profile_id, &data, Uuid::new_v4()).await?);
        }
        tx.commit().await?;

        info!(
            profile_id = %profile_id,
            model = %model,
            count = tasks.len(),
            used_fallback,
            "Generated tasks"
        );
        Ok(GeneratedTasks {
            tasks,
            model,
            used_fallback,
        })
    }
}
