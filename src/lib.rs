pub mod cascade;
pub mod config;
pub mod error;
pub mod loader;
pub mod output;
pub mod records;
pub mod rules;
