//! # doc-chat CLI (`docchat`)
//!
//! Command-line front end for the doc-chat backend: document ingestion,
//! hybrid search, and retrieval-augmented chat.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat user add <id> <name>` | Register a user profile |
//! | `docchat ingest <file.pdf> --user <id>` | Ingest a PDF into the index |
//! | `docchat search "<query>" --user <id>` | Hybrid search over indexed passages |
//! | `docchat chat start --user <id>` | Open a chat session |
//! | `docchat chat send "<message>" --user <id>` | Send one chat turn |
//! | `docchat chat history --user <id>` | Print the conversation |
//! | `docchat delete-document <id> --user <id>` | Remove a document's passages |
//! | `docchat update-metadata <id> --user <id>` | Patch a document's metadata |
//! | `docchat collection create\|delete <name>` | Manage collections |
//!
//! Credentials come from the environment: `OPENAI_API_KEY` (embeddings and
//! completions) and optionally `QDRANT_API_KEY`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use doc_chat::chat::{format_ts_iso, ChatSession};
use doc_chat::completion::OpenAiChat;
use doc_chat::config::{load_config, Config};
use doc_chat::embedding::EmbeddingClient;
use doc_chat::ingest::{self, DocumentType};
use doc_chat::qdrant::QdrantIndex;
use doc_chat::vectorizer::ServiceVectorizer;
use doc_chat::{db, migrate, search};

use doc_chat_core::index::{CollectionConfig, DistanceStrategy, VectorIndex};

/// doc-chat — document-grounded conversational QA over your PDFs.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "doc-chat — PDF ingestion, hybrid retrieval, and retrieval-augmented chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage user profiles.
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Ingest a PDF document into the vector index.
    Ingest {
        /// Path to the PDF file.
        file: PathBuf,

        /// Owner user id.
        #[arg(long)]
        user: String,

        /// Document taxonomy: repository or project.
        #[arg(long, default_value = "project")]
        document_type: DocumentType,
    },

    /// Hybrid search over the owner's indexed passages.
    Search {
        query: String,

        /// Owner user id.
        #[arg(long)]
        user: String,

        /// Maximum results.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Retrieval-augmented chat.
    Chat {
        #[command(subcommand)]
        command: ChatCommands,
    },

    /// Remove every indexed passage of a document.
    DeleteDocument {
        document_id: String,

        /// Owner user id.
        #[arg(long)]
        user: String,
    },

    /// Merge new metadata fields into a document's passages.
    UpdateMetadata {
        document_id: String,

        /// Owner user id.
        #[arg(long)]
        user: String,

        /// Document taxonomy: repository or project.
        #[arg(long, default_value = "repository")]
        document_type: DocumentType,

        /// Metadata field to set, as key=value. Repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Manage vector collections.
    Collection {
        #[command(subcommand)]
        command: CollectionCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register or rename a user profile.
    Add { id: String, name: String },
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Open a session: persists the system prompt and returns the greeting.
    Start {
        #[arg(long)]
        user: String,
    },

    /// Send one message and print the assistant reply.
    Send {
        message: String,

        #[arg(long)]
        user: String,
    },

    /// Print the conversation (user and assistant turns only).
    History {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum CollectionCommands {
    /// Create a collection if it does not exist.
    Create {
        name: String,

        /// Distance strategy for the dense space: cosine, dot, or euclid.
        #[arg(long, default_value = "cosine")]
        distance: DistanceStrategy,
    },

    /// Delete a collection.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("database initialized");
        }

        Commands::User { command } => match command {
            UserCommands::Add { id, name } => {
                let pool = db::connect(&config).await?;
                migrate::run_migrations(&pool).await?;
                db::upsert_user(&pool, &id, &name).await?;
                pool.close().await;
                println!("user {id} registered as {name}");
            }
        },

        Commands::Ingest {
            file,
            user,
            document_type,
        } => {
            let index = QdrantIndex::new(&config.qdrant)?;
            let vectorizer = build_vectorizer(&config)?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_string())
                .unwrap_or_else(|| file.display().to_string());
            let bytes = std::fs::read(&file)?;

            let report = ingest::ingest_document(
                &index,
                &vectorizer,
                &config,
                &user,
                &filename,
                &bytes,
                document_type,
            )
            .await?;

            println!("ingested {}", report.document_id);
            println!("  pages: {}", report.pages);
            println!("  passages indexed: {}", report.passages_indexed);
            if report.chunks_skipped > 0 {
                println!("  chunks skipped: {}", report.chunks_skipped);
            }
        }

        Commands::Search { query, user, k } => {
            let index = QdrantIndex::new(&config.qdrant)?;
            let vectorizer = build_vectorizer(&config)?;
            let hits = search::search(&index, &vectorizer, &config, &user, &query, k).await?;

            if hits.is_empty() {
                println!("No results.");
            } else {
                for hit in hits {
                    println!(
                        "{:.3}  {} (page {})\n      {}",
                        hit.score, hit.title, hit.page, hit.excerpt
                    );
                }
            }
        }

        Commands::Chat { command } => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            let index = QdrantIndex::new(&config.qdrant)?;
            let vectorizer = build_vectorizer(&config)?;
            let model = OpenAiChat::new(&config.completion)?;

            match command {
                ChatCommands::Start { user } => {
                    let session =
                        ChatSession::new(&pool, &index, &vectorizer, &model, &config, user);
                    let message = session.start().await?;
                    println!("{}", message.content);
                }
                ChatCommands::Send { message, user } => {
                    let session =
                        ChatSession::new(&pool, &index, &vectorizer, &model, &config, user);
                    let reply = session.send(&message).await?;
                    println!("{}", reply.content);
                }
                ChatCommands::History { user } => {
                    let session =
                        ChatSession::new(&pool, &index, &vectorizer, &model, &config, user);
                    for message in session.history().await? {
                        println!(
                            "[{}] {}: {}",
                            format_ts_iso(message.created_at),
                            message.role.as_str(),
                            message.content
                        );
                    }
                }
            }
            pool.close().await;
        }

        Commands::DeleteDocument { document_id, user } => {
            let index = QdrantIndex::new(&config.qdrant)?;
            ingest::delete_document(&index, &config, &user, &document_id).await?;
            println!("deleted document {document_id}");
        }

        Commands::UpdateMetadata {
            document_id,
            user,
            document_type,
            set,
        } => {
            let index = QdrantIndex::new(&config.qdrant)?;
            let mut fields = serde_json::Map::new();
            for pair in &set {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("--set expects key=value, got '{pair}'"))?;
                fields.insert(key.to_string(), value.into());
            }
            let updated = ingest::update_document_metadata(
                &index,
                &config,
                &user,
                &document_id,
                document_type,
                fields,
            )
            .await?;
            if updated {
                println!("metadata updated for {document_id}");
            } else {
                println!("no passages found for {document_id}");
            }
        }

        Commands::Collection { command } => {
            let index = QdrantIndex::new(&config.qdrant)?;
            match command {
                CollectionCommands::Create { name, distance } => {
                    let collection_config = CollectionConfig {
                        dense_size: config.embedding.dims,
                        distance,
                        ..CollectionConfig::new(config.embedding.dims)
                    };
                    if index.ensure_collection(&name, &collection_config).await? {
                        println!("collection {name} created");
                    } else {
                        println!("collection {name} already exists");
                    }
                }
                CollectionCommands::Delete { name } => {
                    if index.delete_collection(&name).await? {
                        println!("collection {name} deleted");
                    } else {
                        println!("collection {name} not found");
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_vectorizer(config: &Config) -> Result<ServiceVectorizer> {
    let embedding = EmbeddingClient::new(&config.embedding)?;
    Ok(ServiceVectorizer::new(
        embedding,
        config.retrieval.sparse_vocab_size,
    ))
}
