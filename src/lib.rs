//! SEOPILOT — conversational SEO analyst backend.
//!
//! The assistant chats through the Anthropic Messages API, decides which
//! Just-Magic analysis operation to run, submits it as an asynchronous job,
//! tracks it to a terminal state and feeds the normalized result back into
//! the conversation.

pub mod anthropic;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;
pub mod tools;
pub mod tracker;
