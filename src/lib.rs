pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod nodes;
pub mod server;
pub mod speech;
pub mod state;
