//! Report module.
//!
//! Parses the executor's JSON reports and caches them per category.

mod models;
mod parser;
mod store;

pub use models::*;
pub use parser::*;
pub use store::*;

#[cfg(test)]
pub(crate) use store::tests::{report_json, write_report};
