//! HTTP request-handling layer.
//!
//! Maps limiter outcomes to responses: admitted requests get 200, denied ones
//! 429, and an unreachable store 503.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, ApiError, USER_ID_HEADER};
