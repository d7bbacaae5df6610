// Core modules
pub mod broker;
pub mod exchange;
pub mod feed;
pub mod models;
pub mod session;
pub mod store;
pub mod strategy;
pub mod worker;

// Re-export commonly used types
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
