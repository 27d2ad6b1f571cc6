pub mod achievements;
pub mod completion;
pub mod config;
pub mod ollama;
pub mod profile;
pub mod profile_locks;
pub mod progression;
pub mod task_generator;
