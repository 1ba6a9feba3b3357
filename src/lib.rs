//! testpulse - test report aggregation service
//!
//! Serves per-run test reports written by the test executor under
//! `<root>/<category>/reports/` to the dashboard.

pub mod aggregate;
pub mod config;
pub mod reports;
pub mod service;
pub mod web;
