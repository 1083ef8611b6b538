//! Core types and algorithms for the Bylaw legislation store.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the domain model (legislation, branches, parameters, versions, schedules),
//! the pure rule engines that guard it, and the [`store::LegislationStore`]
//! trait that storage backends implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod branch;
pub mod conflict;
pub mod consolidate;
pub mod error;
pub mod gis;
pub mod legislation;
pub mod merge;
pub mod parameter;
pub mod schedule;
pub mod store;
pub mod timeline;
pub mod version;
pub mod wms;

pub use error::{Error, ErrorKind, Result};
