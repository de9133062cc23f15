//! HTTP middleware stack: CORS and per-request trace-id spans.

pub mod cors;
pub mod trace;
