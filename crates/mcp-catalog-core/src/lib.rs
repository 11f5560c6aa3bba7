//! # MCP Catalog Core
//!
//! Shared, I/O-free logic for MCP Catalog: the repository data model,
//! the accepted/proposed manifest state machine, preferred-config
//! selection, category metadata, candidate dedup, the store abstraction,
//! and the port traits for the code-search and extraction services.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Concrete
//! adapters (GitHub, OpenAI, SQLite) and the ingestion pipeline live in
//! the `mcp-catalog` app crate.

pub mod candidate;
pub mod manifest;
pub mod metadata;
pub mod models;
pub mod oracle;
pub mod source;
pub mod store;
pub mod tools;
