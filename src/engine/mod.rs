pub mod client;
pub mod error;
pub mod types;

pub use client::{EngineApi, EngineClient};
pub use error::EngineError;
pub use types::{JobKind, RemoteState, TaskStatus};
