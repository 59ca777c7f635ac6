pub mod engine;
pub mod template;

pub use engine::BroadcastEngine;
pub use template::{BroadcastResult, BroadcastTemplate};
