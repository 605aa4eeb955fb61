pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Facades
pub use api::{Debiai, Model, Project, Selection, Tag};

pub use config::AppConfig;
pub use error::{DebiaiError, Result};

// Engine entry points
pub use logic::{
    compute_sample_hash, decode_tree, encode_rows, reconcile, LogProgress, NoProgress,
    ProgressReporter, SchemaWarning,
};

pub use model::*;

pub use store::{Backend, HttpBackend, MemoryBackend};

/// Initialise `env_logger` with an `info` default filter. Does nothing when a
/// logger is already installed.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
