pub mod chat;
pub mod config;
pub mod errors;
pub mod llm_client;
pub mod models;
pub mod relay;
pub mod resume;
pub mod routes;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;
