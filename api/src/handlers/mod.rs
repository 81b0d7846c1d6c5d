//! HTTP request handlers for the read API.

pub mod graph;
pub mod health;
pub mod projects;
pub mod search;
pub mod telemetry;
