pub mod app;
pub mod appresult;
pub mod auth;
pub mod cache;
pub mod gateway;
pub mod profile;
pub mod res;
pub mod rooms;
pub mod view;

pub use app::{ChatApp, SessionState};
pub use appresult::{AppError, AppResult, ChatError};

/// The always-present landing room. Cannot be deleted.
pub const DEFAULT_ROOM_NAME: &str = "default";
