// MindHarbor - Grounded support chat with a classical retrieval core
// License: Apache-2.0

pub mod agent;
pub mod config;
pub mod ingest;
pub mod logger;
pub mod metrics;
pub mod provider;
pub mod retrieval;
pub mod session;
pub mod web;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
