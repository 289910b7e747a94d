//! Top-level module for the Markov babble generation system.
//!
//! This crate provides a variable-order Markov token generator, including:
//! - Context keys over token sequences (`Context`)
//! - Per-context continuation counts (`FrequencyTable`)
//! - The backoff frequency model itself (`MarkovModel`)
//! - An infinite, restartable generation interface (`Generator`)

/// Interned tokens and context keys.
///
/// A context is the ordered sequence of 0..n most recent tokens and is
/// used as the lookup key into the model.
pub mod context;

/// Continuation counts observed for a single context.
///
/// Tracks occurrences per token and supports weighted random sampling.
pub mod frequency_table;

/// Backoff frequency model over variable-length contexts.
///
/// Handles training, merging, parallel corpus construction and
/// the serialized model format.
pub mod markov_model;

/// Infinite token generation over a trained model.
///
/// Exposes reset/reseed control, backoff-on-miss, clause-aware context
/// truncation, manual selection and the saturation query.
pub mod generator;
