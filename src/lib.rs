//! Library crate for keyword-scan exposing reusable modules.
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod matcher;
pub mod registry;
pub mod scanner;
pub mod server;
pub mod store;
pub mod types;
