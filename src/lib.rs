//! Home Decor AI Assistant: upload up to four pictures of a room, ask a
//! question, and get an answer from a multimodal model served by Ollama

pub mod assistant;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod model;
pub mod question;
pub mod render;
pub mod server;
