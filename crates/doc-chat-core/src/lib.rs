//! # doc-chat Core
//!
//! Shared, I/O-free logic for doc-chat: data models, text chunking, the
//! sparse TF-IDF encoder, distribution-based score fusion, and the vector
//! index abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem access.
//! Everything here is deterministic and unit-testable; the application
//! crate supplies the Qdrant, OpenAI, and SQLite implementations.

pub mod chunk;
pub mod fusion;
pub mod index;
pub mod models;
pub mod sparse;
pub mod vectorize;
