//! Scoring engine for structured self-report questionnaires.
//!
//! Sessions are opened against a catalog entry, collect one answer per question, and are
//! finalized into an immutable result carrying the score, severity band, guidance tier and,
//! for urgent tiers, emergency resources.

pub mod assessments;
pub mod config;
pub mod error;
pub mod telemetry;
