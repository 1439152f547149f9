//! logship Transport - HTTP delivery of batches
//!
//! Implements the `ISender` port from `logship-core` over HTTP:
//! - Batch serialization to the collector wire format
//! - Status classification (`Recoverable` / `Fatal` / `Partial`)
//! - `Retry-After` hints on throttling responses
//! - An offline switch that reports `ConnectionPaused` without touching the network
//!
//! The sender never retries; retry and backoff belong to the channel.
//!
//! ## Modules
//!
//! - [`client`] - [`HttpSender`], the reqwest-based sender
//! - [`wire`] - Request and response bodies of `POST /v1/logs`
//! - [`retry_after`] - `Retry-After` header parsing

pub mod client;
pub mod retry_after;
pub mod wire;

pub use client::{HttpSender, HttpSenderConfig};
