pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod platform;
pub mod queue;
pub mod safety;
pub mod search;
pub mod server;
pub mod shutdown;
pub mod webhook;
pub mod workflow;
