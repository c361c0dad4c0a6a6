//! Sable — streaming tool-call agent core
//!
//! The engine of an editor-integrated coding assistant: it streams a chat
//! completion, incrementally parses XML-formatted tool invocations out of
//! the live token stream, executes the requested tools, feeds results back
//! into conversation history, and repeats until the model signals
//! completion or a loop limit trips.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sable::prelude::*;
//!
//! # async fn example() -> sable::error::Result<()> {
//! let config = SableConfig::from_env()?;
//! let transport = Arc::new(OpenAiChatTransport::from_config(&config));
//! let executor = Arc::new(ToolExecutor::new(
//!     Arc::new(sable::tools::builtin::default_registry()),
//!     Arc::new(AllowAll),
//! ));
//!
//! let request = TaskRequest::new("Rename foo to bar in src/lib.rs", "You are a coding agent.")
//!     .with_max_loops(config.max_loops);
//! let handle = Task::spawn(request, transport, executor);
//! let outcome = handle.wait().await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod parser;
pub mod permission;
pub mod prelude;
pub mod task;
pub mod tools;
pub mod transport;
pub mod types;
