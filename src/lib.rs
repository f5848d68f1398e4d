pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod manifest;
pub mod output;
pub mod query;
pub mod store;
