pub mod config;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod scheduler;
pub mod scraper;
pub mod storage;
pub mod subscription;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use monitor::{Monitor, RunReport};
pub use scheduler::{MonitorScheduler, SchedulerStats};
pub use subscription::SubscriptionService;
pub use utils::error::{AppError, MonitorError};

pub type Result<T> = std::result::Result<T, AppError>;
