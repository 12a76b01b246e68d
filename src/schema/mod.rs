//! Input schema and loading
//!
//! This module turns source files (combined CSV, separate CGM export and
//! food log, or typed NDJSON) into a dataset of glucose readings and food
//! events. Column names are configurable; everything downstream consumes
//! typed values only.

mod loader;
mod record;

pub use loader::*;
pub use record::*;
