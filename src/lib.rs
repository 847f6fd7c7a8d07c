//! Client library for the Llama chat-completion API.
//!
//! [`api::Client`] sends requests through a [`api::Transport`]. Streaming
//! responses come back as an [`api::ChatStream`], which decodes each frame
//! and folds it into a running [`api::Snapshot`] of the completion.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod tools;
pub mod ui;

pub use error::{LlamaError, Result};
