//! # MCP Catalog
//!
//! Discovers MCP server repositories on GitHub, extracts their launch
//! manifests and tool catalogs with a language model, and stores them for a
//! browsing UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │ Discovery │──▶│ Ingestion  │──▶│  SQLite  │
//! │ seeds +   │   │ + backfill │   │  store   │
//! │ search    │   └─────┬──────┘   └────┬─────┘
//! └───────────┘         │               │
//!                 ┌─────┴─────┐   ┌─────┴─────┐
//!                 │  GitHub   │   │ CLI / HTTP│
//!                 │  OpenAI   │   │ scheduler │
//!                 └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! catalog init                          # create database
//! catalog add modelcontextprotocol/servers/src/github
//! catalog collect --limit 200           # discovery + ingestion
//! catalog list --tag "Developer Tools"
//! catalog serve                         # HTTP API (+ daily schedule)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`github`] | GitHub code search and contents client |
//! | [`oracle`] | OpenAI chat-completions extraction client |
//! | [`analysis`] | Extraction prompts and reply decoding |
//! | [`retry`] | Bounded rate-limit retry |
//! | [`discovery`] | Candidate discovery |
//! | [`ingest`] | Single-candidate ingestion |
//! | [`backfill`] | Tool-definition backfill |
//! | [`service`] | Collection runs and curator operations |
//! | [`server`] | HTTP API |
//! | [`scheduler`] | Daily collection trigger |
//! | [`sqlite_store`] | SQLite store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis;
pub mod backfill;
pub mod commands;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod github;
pub mod ingest;
pub mod migrate;
pub mod oracle;
pub mod retry;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod sqlite_store;
