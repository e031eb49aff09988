//! Firestore REST API client for RestoInsight.
//!
//! This crate provides:
//! - Service account authentication via gcp_auth, with a token cache
//! - Emulator support through `FIRESTORE_EMULATOR_HOST`
//! - Create, upsert and merge writes
//! - A typed repository over the dashboard collections

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{collections, InsightRepository};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
