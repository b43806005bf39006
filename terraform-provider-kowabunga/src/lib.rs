//! Terraform Provider for Kowabunga
//!
//! Implements the Terraform plugin protocol (newline-delimited JSON-RPC over
//! stdin/stdout) for the Kowabunga private cloud: regions, zones, hosts,
//! storage, networks, projects, compute and managed services.

pub mod client;
pub mod data_sources;
pub mod engine;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod resources;
pub mod schema;
pub mod session;
pub mod timeouts;
pub mod validators;

pub use provider::KowabungaProvider;
