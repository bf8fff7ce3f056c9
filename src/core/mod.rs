pub mod types;
pub mod config;
pub mod connector;
pub mod error;
