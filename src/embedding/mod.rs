// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns report text into vectors
//!
//! Providers are pluggable; callers go through [`retry`] so transient
//! outages are retried and bad vectors never reach the store.

pub mod provider;
pub mod retry;

pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, HashingProvider, HttpProvider,
};
pub use retry::{embed_batch_with_retry, embed_with_retry, RetryPolicy};
