//! Retry logic with exponential backoff
//!
//! This module provides:
//! - Error classification (network vs application vs re-authentication)
//! - Capped exponential backoff without jitter
//! - The [`RetryEngine`], which drives repeated connection checks through
//!   the status register

pub mod backoff;
pub mod classifier;
pub mod engine;

pub use backoff::BackoffPolicy;
pub use classifier::{ErrorClass, RetryClassifiable, classify_message};
pub use engine::RetryEngine;
