pub mod config;
pub mod error;
pub mod fsops;
pub mod progress;
pub mod prompt;
pub mod update;

pub use config::Config;
pub use error::UpdateError;
pub use update::{OrchestratorState, Services, UpdateArguments, Updater};
