pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod llm;
pub mod log_service;
pub mod logging;
pub mod message;
pub mod models;
pub mod quiz;
pub mod quran;
pub mod student_service;

pub use auth::AuthService;
pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use llm::EncouragementService;
pub use log_service::LogService;
pub use models::*;
pub use quiz::QuizSession;
pub use student_service::StudentService;
