//! Validated runtime configuration shared by the server and the processors.
//!
//! Parsing and file handling live in the server crate; these types only carry
//! what the core needs.

mod admin;
mod chain;
mod webhook;

pub use admin::AdminConfig;
pub use chain::{ChainConfig, TokenConfig};
pub use webhook::WebhookConfig;
