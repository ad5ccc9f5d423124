//! # adlens
//!
//! **Campaign-analytics question answering over hybrid retrieval.**
//!
//! adlens turns structured ad-campaign metrics into retrievable text
//! chunks, classifies what a free-text question is really asking,
//! retrieves the most relevant chunks with metadata filtering and
//! intent-aware reranking, and assembles a bounded prompt for a language
//! model — packaging the answer with source attribution.
//!
//! ## Data Flow
//!
//! 1. The **loader** ([`loader`]) reads and validates the campaigns file.
//! 2. The **chunker** (`adlens_core::chunker`) emits overview, daily,
//!    insight, comparison, and global-insight chunks.
//! 3. Chunks are embedded ([`embedding`]) and built into an immutable
//!    index generation (`adlens_core::index`), swapped in atomically.
//! 4. Per query, the **pipeline** ([`pipeline`]) classifies intent,
//!    retrieves with hybrid scoring, assembles the prompt, and calls the
//!    **LLM provider** ([`llm`]).
//! 5. Results are exposed via the CLI (`adlens`) and the HTTP server
//!    ([`server`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`loader`] | Campaigns-file loading and schema validation |
//! | [`embedding`] | Embedding providers: feature-hash, OpenAI, disabled |
//! | [`llm`] | Generation providers: canned, OpenAI, disabled |
//! | [`ingest`] | Index-build orchestration (chunk → embed → generation) |
//! | [`pipeline`] | Query orchestration and degraded-response handling |
//! | [`server`] | JSON HTTP server (Axum) with CORS |

pub mod config;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod server;
