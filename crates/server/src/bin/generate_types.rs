use std::{env, fs, path::Path};

use ts_rs::TS;

fn generate_types_content() -> String {
    const HEADER: &str = "// This file was generated by `cargo run --bin generate-types`.\n\
// Do not edit manually; edit the Rust types instead.\n\n";

    let decls: Vec<String> = vec![
        utils::response::ApiResponse::<(), ()>::decl(),
        db::models::category::Category::decl(),
        db::models::category::CategoryInfo::decl(),
        db::models::task::Difficulty::decl(),
        db::models::task::Frequency::decl(),
        db::models::task::TaskSource::decl(),
        db::models::task::Task::decl(),
        db::models::task::CreateTask::decl(),
        db::models::task::UpdateTask::decl(),
        db::models::goal::GoalPriority::decl(),
        db::models::goal::Goal::decl(),
        db::models::goal::GoalResponse::decl(),
        db::models::goal::CreateGoal::decl(),
        db::models::goal::UpdateGoal::decl(),
        db::models::goal::GoalProgress::decl(),
        db::models::profile::Skill::decl(),
        db::models::profile::Profile::decl(),
        db::models::profile::UpdateProfile::decl(),
        db::models::achievement::AchievementCondition::decl(),
        db::models::achievement::Achievement::decl(),
        db::models::achievement::AchievementWithStatus::decl(),
        db::models::achievement::CategoryProgress::decl(),
        db::models::achievement::AchievementStats::decl(),
        services::services::progression::LevelProgress::decl(),
        services::services::profile::ProfileView::decl(),
        services::services::profile::ProfileUpdate::decl(),
        services::services::completion::UnlockedAchievement::decl(),
        services::services::completion::EffectSummary::decl(),
        services::services::completion::TaskCompletion::decl(),
        services::services::completion::GoalCompletion::decl(),
        services::services::completion::GoalUpdate::decl(),
        services::services::task_generator::ModelType::decl(),
        services::services::task_generator::GenerateTasksRequest::decl(),
        services::services::task_generator::GenerateAdvancedRequest::decl(),
        services::services::task_generator::GeneratedTasks::decl(),
        server::routes::achievements::CatalogInitialized::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| {
            let trimmed = d.trim_start();
            if trimmed.starts_with("export") {
                d
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{HEADER}{body}\n")
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let check_mode = args.iter().any(|arg| arg == "--check");

    let shared_path = Path::new("shared");
    let types_path = shared_path.join("types.ts");
    let generated = generate_types_content();

    if check_mode {
        let current = fs::read_to_string(&types_path).unwrap_or_default();
        if current == generated {
            println!("✅ shared/types.ts is up to date.");
            std::process::exit(0);
        } else {
            eprintln!("❌ shared/types.ts is not up to date. Please run 'cargo run --bin generate-types' and commit the changes.");
            std::process::exit(1);
        }
    }

    println!("Generating TypeScript types…");
    fs::create_dir_all(shared_path).expect("cannot create shared");
    fs::write(&types_path, generated).expect("unable to write types.ts");
    println!("✅ TypeScript types generated in shared/");
}
