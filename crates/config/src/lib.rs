//! Configuration: file discovery and loading with `${ENV}` substitution, plus
//! database settings resolved from the environment.

pub mod db;
pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    db::DbConfig,
    loader::discover_and_load,
    schema::{GatewayConfig, LoquatConfig},
};
