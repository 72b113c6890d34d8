//! inference-core Library
//!
//! This library provides the core functionality for the inference-core chat
//! service: turn orchestration over retrieved context, conversation and lead
//! persistence, and background lead-qualification analysis.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `analysis_worker`: Bounded background analysis worker pool.
//! - `chat_orchestrator`: Per-turn pipeline.
//! - `config`: Configuration management.
//! - `conversation_store`: Conversation/lead persistence operations.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `extraction`: Guards for model-extracted profile fields.
//! - `handlers`: HTTP request handlers.
//! - `key_locks`: Per-key async serialization.
//! - `lead_analyzer`: Transcript scoring and profile extraction.
//! - `llm_client`: Gemini generation client.
//! - `models`: Core data models.
//! - `semantic_client`: Semantic-adapter search client.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod analysis_worker;
pub mod chat_orchestrator;
pub mod config;
pub mod conversation_store;
pub mod db;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod key_locks;
pub mod lead_analyzer;
pub mod llm_client;
pub mod models;
pub mod semantic_client;
