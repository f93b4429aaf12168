//! Configuration for the roundtable orchestrator: schema, file discovery
//! and environment overrides.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, discover_and_load, load_config},
    schema::{AuthorityConfig, ConversationConfig, RoundtableConfig, ServerConfig},
};
