//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository primitives into atomic use-case operations.
//! - Keep request payload shapes decoupled from storage details.

pub mod route_sync;
