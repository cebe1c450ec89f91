pub mod persistence;
pub mod store;
pub mod sync;
pub mod types;

pub use store::{RuleSource, RuleStore};
pub use sync::SyncEngine;
pub use types::*;
