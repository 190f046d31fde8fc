pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod signaling;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
