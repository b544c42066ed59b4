//! quota-bucket - Token Bucket Request Quotas
//!
//! This crate enforces a per-identity request quota with the token-bucket
//! algorithm. Bucket state lives in a shared store (Redis in production), and
//! every check runs as one atomic operation inside that store, so any number
//! of service replicas see a single consistent quota per identity.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
