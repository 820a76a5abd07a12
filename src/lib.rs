pub mod agent;
pub mod config;
pub mod error;
pub mod platform;
pub mod queue;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod webhook;
pub mod workflow;
pub mod workspace;

#[cfg(test)]
mod testing;
