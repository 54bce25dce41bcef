// src/lib.rs

//! Board Harvester Library
//!
//! Collects posts from a read-only board API, passes them through two content
//! classifiers and keeps both raw and annotated records as JSON lines.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
