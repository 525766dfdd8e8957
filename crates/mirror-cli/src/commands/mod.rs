//! Command implementations for mirror-cli

pub mod init;
pub mod run;
pub mod validate;

pub use init::{InitOptions, run_init};
pub use run::run_sync;
pub use validate::run_validate;
