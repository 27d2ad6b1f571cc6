use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use db::DBService;
use http_body_util::BodyExt;
use local_deployment::LocalDeployment;
use serde_json::{Value, json};
use server::routes;
use services::services::{
    config::{AiConfig, Config},
    ollama::{GenerationRequest, OllamaError, TextGenerator},
};
use tower::ServiceExt;
use uuid::Uuid;

struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, OllamaError> {
        Err(OllamaError::Transport("connection refused".to_string()))
    }
}

async fn app() -> Router {
    let db = DBService::new_in_memory().await.unwrap();
    let config = Config {
        ai: AiConfig {
            timeout: Duration::from_millis(200),
            ..AiConfig::default()
        },
        ..Config::default()
    };
    let deployment = LocalDeployment::with_parts(config, db, Arc::new(OfflineGenerator))
        .await
        .unwrap();
    routes::router(deployment)
}

async fn call(app: &Router, method: Method, uri: &str, profile: Uuid, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-profile-id", profile.to_string());
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn create_task(app: &Router, profile: Uuid, body: Value) -> String {
    let (status, json) = call(app, Method::POST, "/tasks", profile, Some(body)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_ok() {
    let app = app().await;
    let (status, json) = call(&app, Method::GET, "/health", Uuid::new_v4(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], "OK");
}

#[tokio::test]
async fn new_profile_starts_at_level_one() {
    let app = app().await;
    let (status, json) = call(&app, Method::GET, "/profile", Uuid::new_v4(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["xp"], 0);
    assert_eq!(json["data"]["level"], 1);
    assert_eq!(json["data"]["skill_points_available"], 0);
    assert_eq!(json["data"]["skills"]["problem_solving"], 1);
}

#[tokio::test]
async fn invalid_profile_header_is_rejected() {
    let app = app().await;
    let request = Request::builder()
        .uri("/profile")
        .header("x-profile-id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completing_a_task_returns_effect_summary() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let task_id = create_task(&app, profile, json!({"title": "Stretch", "xp": 50, "difficulty": "easy"})).await;

    let (status, json) = call(&app, Method::POST, &format!("/tasks/{task_id}/complete"), profile, None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &json["data"];
    assert_eq!(data["xp_gained"], 50);
    assert_eq!(data["level_up"], true);
    assert_eq!(data["old_level"], 1);
    assert_eq!(data["new_level"], 2);
    assert_eq!(data["skill_bonuses"], json!({}));
    assert_eq!(data["achievements"][0]["name"], "First Steps");
    assert_eq!(data["task"]["completed"], true);

    let (status, json) = call(&app, Method::POST, &format!("/tasks/{task_id}/complete"), profile, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);

    let (_, json) = call(&app, Method::GET, "/profile", profile, None).await;
    assert_eq!(json["data"]["xp"], 50);
}

#[tokio::test]
async fn inactive_task_completion_conflicts() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let task_id = create_task(&app, profile, json!({"title": "Swim"})).await;

    let (status, json) = call(&app, Method::POST, &format!("/tasks/{task_id}/toggle-active"), profile, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["is_active"], false);

    let (status, _) = call(&app, Method::POST, &format!("/tasks/{task_id}/complete"), profile, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let app = app().await;
    let uri = format!("/tasks/{}/complete", Uuid::new_v4());
    let (status, _) = call(&app, Method::POST, &uri, Uuid::new_v4(), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tasks_are_isolated_per_profile() {
    let app = app().await;
    let owner = Uuid::new_v4();
    let task_id = create_task(&app, owner, json!({"title": "Journal"})).await;

    let stranger = Uuid::new_v4();
    let (status, _) = call(&app, Method::DELETE, &format!("/tasks/{task_id}"), stranger, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = call(&app, Method::GET, "/tasks", owner, None).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn task_patch_can_link_and_unlink_goal() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let (_, goal) = call(&app, Method::POST, "/goals", profile, Some(json!({"title": "Marathon", "category": "fitness"}))).await;
    let goal_id = goal["data"]["id"].as_str().unwrap().to_string();
    let task_id = create_task(&app, profile, json!({"title": "Run"})).await;

    let uri = format!("/tasks/{task_id}");
    let (status, json) = call(&app, Method::PATCH, &uri, profile, Some(json!({"goal_id": goal_id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["goal_id"], goal_id.as_str());

    let (_, json) = call(&app, Method::PATCH, &uri, profile, Some(json!({"goal_id": null}))).await;
    assert_eq!(json["data"]["goal_id"], Value::Null);

    let (status, _) = call(&app, Method::PATCH, &uri, profile, Some(json!({"goal_id": Uuid::new_v4()}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn goal_progress_validation_and_auto_completion() {
    let app = app().await;
    let profile = Uuid::new_v4();

    let (status, _) = call(&app, Method::POST, "/goals", profile, Some(json!({"title": "Save", "progress": -0.1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(&app, Method::POST, "/goals", profile, Some(json!({"title": "Save", "priority": "high"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["progress"], 0.0);
    let goal_id = json["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/goals/{goal_id}");
    let (status, json) = call(&app, Method::PATCH, &uri, profile, Some(json!({"progress": 0.85}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["goal"]["completed"], true);
    assert_eq!(json["data"]["goal"]["progress"], 1.0);
    assert_eq!(json["data"]["completion"]["xp_gained"], 200);

    let (status, _) = call(&app, Method::POST, &format!("{uri}/complete"), profile, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = call(&app, Method::GET, "/profile", profile, None).await;
    assert_eq!(json["data"]["xp"], 200);
    assert_eq!(json["data"]["level"], 3);
    assert_eq!(json["data"]["skill_points_available"], 2);
}

#[tokio::test]
async fn skill_allocation_over_budget_is_rejected() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let (status, json) = call(&app, Method::PATCH, "/profile", profile, Some(json!({"skills": {"strength": 2}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("skill points"));
}

#[tokio::test]
async fn achievements_listing_and_stats() {
    let app = app().await;
    let profile = Uuid::new_v4();

    let (status, json) = call(&app, Method::POST, "/achievements/initialize", profile, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["added"], 0);
    let total = json["data"]["total"].as_u64().unwrap();

    let task_id = create_task(&app, profile, json!({"title": "Stretch"})).await;
    call(&app, Method::POST, &format!("/tasks/{task_id}/complete"), profile, None).await;

    let (_, json) = call(&app, Method::GET, "/achievements", profile, None).await;
    assert_eq!(json["data"].as_array().unwrap().len() as u64, total);

    let (_, json) = call(&app, Method::GET, "/achievements/unlocked", profile, None).await;
    let unlocked: Vec<_> = json["data"].as_array().unwrap().iter().map(|a| a["id"].as_str().unwrap().to_string()).collect();
    assert_eq!(unlocked, vec!["getting_started".to_string()]);

    let (_, json) = call(&app, Method::GET, "/achievements/stats", profile, None).await;
    assert_eq!(json["data"]["unlocked"], 1);
    assert_eq!(json["data"]["total"].as_u64(), Some(total));
}

#[tokio::test]
async fn categories_are_served() {
    let app = app().await;
    let (_, tasks) = call(&app, Method::GET, "/tasks/categories", Uuid::new_v4(), None).await;
    assert_eq!(tasks["data"][0]["id"], "work");
    let (_, goals) = call(&app, Method::GET, "/goals/categories", Uuid::new_v4(), None).await;
    assert_eq!(goals["data"][0]["id"], "career");
}

#[tokio::test]
async fn ai_generation_falls_back_then_cools_down() {
    let app = app().await;
    let profile = Uuid::new_v4();

    let (status, json) = call(&app, Method::POST, "/ai/generate", profile, Some(json!({"goals": "Learn Rust"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["used_fallback"], true);
    assert_eq!(json["data"]["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["tasks"][0]["source"], "ai_generated");

    let (status, json) = call(&app, Method::POST, "/ai/generate-advanced", profile, Some(json!({"category": "learning"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn huge_skill_levels_do_not_bypass_the_budget() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let body = json!({"skills": {"strength": i64::MAX, "focus": i64::MAX}});
    let (status, _) = call(&app, Method::PATCH, "/profile", profile, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(&app, Method::GET, "/profile", profile, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["skills"]["strength"], 1);
    assert_eq!(json["data"]["skill_points_available"], 0);
}

#[tokio::test]
async fn oversized_task_xp_is_rejected() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let (status, _) = call(&app, Method::POST, "/tasks", profile, Some(json!({"title": "Grind", "xp": i64::MAX}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let task_id = create_task(&app, profile, json!({"title": "Grind", "xp": 100000})).await;
    let (status, _) = call(&app, Method::PATCH, &format!("/tasks/{task_id}"), profile, Some(json!({"xp": 100001}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn task_description_can_be_cleared() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let task_id = create_task(&app, profile, json!({"title": "Read", "description": "Two chapters"})).await;
    let uri = format!("/tasks/{task_id}");

    let (_, json) = call(&app, Method::PATCH, &uri, profile, Some(json!({"title": "Read more"}))).await;
    assert_eq!(json["data"]["description"], "Two chapters");

    let (status, json) = call(&app, Method::PATCH, &uri, profile, Some(json!({"description": null}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["description"], Value::Null);
}

#[tokio::test]
async fn goal_progress_endpoint_shares_auto_completion() {
    let app = app().await;
    let profile = Uuid::new_v4();
    let (_, json) = call(&app, Method::POST, "/goals", profile, Some(json!({"title": "Learn Rust"}))).await;
    let goal_id = json["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/goals/{goal_id}/progress");

    let (status, json) = call(&app, Method::POST, &uri, profile, Some(json!({"progress": 0.795}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["goal"]["completed"], false);
    assert_eq!(json["data"]["goal"]["progress_percent"], 79);
    assert_eq!(json["data"]["completion"], Value::Null);

    let (status, _) = call(&app, Method::POST, &uri, profile, Some(json!({"progress": -1.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(&app, Method::POST, &uri, profile, Some(json!({"progress": 0.9}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["goal"]["completed"], true);
    assert_eq!(json["data"]["completion"]["xp_gained"], 150);

    let missing = format!("/goals/{}/progress", Uuid::new_v4());
    let (status, _) = call(&app, Method::POST, &missing, profile, Some(json!({"progress": 0.5}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
