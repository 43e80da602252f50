mod session;
mod turn;

pub use session::SessionStore;
pub use turn::{SYSTEM_PROMPT, ToolCallSummary, TurnConfig, TurnOutcome, run_turn};
