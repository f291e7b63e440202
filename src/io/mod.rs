//! Output helpers.
//!
//! - merged table CSV export (`export`)
//! - full run JSON document (`bands_json`)

pub mod bands_json;
pub mod export;

pub use bands_json::*;
pub use export::*;
