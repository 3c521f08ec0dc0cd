pub mod core;
pub mod harvest;
pub mod scraping;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;

// --- Harvest pipeline entry points ---
pub use crate::harvest::runner::{harvest, Credentials, HarvestConfig, RunReport};
pub use crate::harvest::store::{ContactRecord, UNKNOWN_NAME};
