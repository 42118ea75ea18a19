//! Market Oracle: weekly AI stock-pick competition, paper-trading
//! challenge and market-data API.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod challenge;
pub mod config;
pub mod credits;
pub mod dashboard;
pub mod data;
pub mod engine;
pub mod error;
pub mod llm;
pub mod picks;
pub mod storage;
pub mod types;
