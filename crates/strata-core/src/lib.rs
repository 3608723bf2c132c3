//! strata-core library.
//!
//! Hierarchy engine for a multi-tenant compliance platform:
//!
//! - [`tree`]: build, navigate, and search single-parent forests
//! - [`hierarchy`]: org-unit ("pôle") parenting and tenancy rules
//! - [`relations`]: the multi-parent category graph and its mutation protocol
//! - [`store`]: the persistence seam, with a `SQLite` implementation
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums in the library, `anyhow` at I/O
//!   boundaries.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod relations;
pub mod store;
pub mod tree;

pub use error::{ErrorCode, StrataError};
