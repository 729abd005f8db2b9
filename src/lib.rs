//! Memorial records with owned image storage and AI-assisted lookup.
//!
//! A memorial is a biographical record of a deceased person: name, dates,
//! places, a story, cited sources, and a gallery of images. Images found on the
//! web are copied into a bucket the service owns, shown through time-limited
//! signed URLs, and reclaimed once no record references them.
//!
//! # Architecture
//!
//! - **Records**: SQLite (`rusqlite`), JSON list columns typed on both sides
//! - **Images**: a filesystem bucket addressed by stable object paths, with
//!   HMAC-signed display URLs
//! - **Lookup**: stored-record match first, otherwise web search plus
//!   language-model extraction
//! - **Transport**: HTTP via axum, plus a maintenance CLI
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`memorial`]: Record types and the record store
//! - [`storage`]: Bucket trait, filesystem bucket, and URL signing
//! - [`pipeline`]: Image persistence, signing, submission, uploads, and reclamation
//! - [`enrich`]: Web search and extraction clients
//! - [`service`]: Operations shared by the server and the CLI
//! - [`server`]: HTTP routes

pub mod config;
pub mod db;
pub mod enrich;
pub mod memorial;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod storage;
