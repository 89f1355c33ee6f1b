//! # nlsql harness
//!
//! Turns a natural-language question into a single read-only SQL query,
//! runs it, and answers in natural language. Generated SQL is untrusted:
//! every statement passes a static guardrail before it reaches a read-only,
//! rollback-only connection, and failures are fed back to the model for
//! another attempt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ SchemaCatalog│──▶│  Retrieval   │──▶│ SegmentStore │
//! │ desc + rules │   │ fingerprint │   │ SQLite / mem │
//! └──────────────┘   └──────┬──────┘   └──────────────┘
//!                           ▼ context
//!   question ──▶ ┌──────────────────────┐
//!                │     Orchestrator     │──▶ answer
//!                │ generate → guardrail │
//!                │ → execute → summarize│
//!                └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nlsql init                        # create the harness database
//! nlsql index sync                  # embed the schema description
//! nlsql ask "Which characters are male?"
//! nlsql serve                       # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`catalog`] | Schema description and business rules |
//! | [`fingerprint`] | Content digest for staleness detection |
//! | [`segment`] | Per-table schema splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Segment index backends |
//! | [`retrieval`] | Context retrieval and index maintenance |
//! | [`llm`] | Chat model abstraction |
//! | [`prompt`] | Prompt composition |
//! | [`generation`] | SQL generation, extraction, summarization |
//! | [`guardrail`] | Static SQL safety checks |
//! | [`executor`] | Read-only query execution |
//! | [`few_shot`] | Saved question/SQL examples |
//! | [`orchestrator`] | The generate/validate/execute loop |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask_cmd;
pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod executor;
pub mod few_shot;
pub mod fingerprint;
pub mod generation;
pub mod guardrail;
pub mod http;
pub mod index_cmd;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod segment;
pub mod server;
pub mod store;
