pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
pub mod summary;
