//! Policy agent daemon library.
//!
//! Splits the daemon into its configuration surface ([`config`]), the
//! component wiring ([`agent`]) and the binary entry point in `main.rs`,
//! so the full wiring can be exercised by integration tests.

pub mod agent;
pub mod config;
pub mod error;

pub use agent::Agent;
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
