// Common library shared by the autocommit binary and its tests

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod git;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
