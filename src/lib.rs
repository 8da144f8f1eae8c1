//! # doc-chat
//!
//! A document-grounded conversational question-answering backend.
//!
//! doc-chat ingests PDF documents into a dual-space (dense + sparse) Qdrant
//! collection and serves per-user chat sessions that retrieve fused hybrid
//! context for every turn before calling a completion model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌───────────────┐
//! │  PDF upload  │──▶│ Ingestion Pipeline │──▶│    Qdrant     │
//! │   (bytes)    │   │ extract→chunk→vec │   │ dense+sparse  │
//! └──────────────┘   └───────────────────┘   └──────┬────────┘
//!                                                   │ hybrid (DBSF)
//!                    ┌───────────────────┐          ▼
//!                    │   Chat Session    │◀── retrieved context
//!                    │ history + prompt  │
//!                    └────────┬──────────┘
//!                             ▼
//!                    ┌───────────────────┐   ┌───────────────┐
//!                    │ Completion model  │   │    SQLite     │
//!                    │  (30s deadline)   │   │  message log  │
//!                    └───────────────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite pool and user-profile lookups |
//! | [`migrate`] | Idempotent schema creation |
//! | [`embedding`] | OpenAI embeddings client (degrades to empty on failure) |
//! | [`completion`] | Chat-completions client and the `CompletionModel` seam |
//! | [`vectorizer`] | Dense + sparse `Vectorizer` implementation |
//! | [`qdrant`] | `VectorIndex` implementation over the Qdrant REST API |
//! | [`ingest`] | Ingestion pipeline, document delete, metadata patch |
//! | [`search`] | Hybrid search boundary operation |
//! | [`chat`] | Per-user chat session state machine |
//!
//! Pure algorithms (chunking, sparse encoding, score fusion, the index
//! trait and its in-memory test double) live in the `doc-chat-core` crate.

pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod qdrant;
pub mod search;
pub mod vectorizer;
