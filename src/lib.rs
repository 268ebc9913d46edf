// src/lib.rs

//! Missing issues audit library.
//!
//! Finds processed stories that lack a frontend or backend implementation
//! issue, pacing and caching the repository scans it needs.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
