pub mod broadcast;
pub mod cli;
pub mod directory;
pub mod error;
pub mod k8s;
pub mod server;

pub use error::{BroadcastError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
