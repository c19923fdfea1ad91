//! Core types and trait definitions for the Canvass verification pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! It defines the person lifecycle state machine, the role-scoped
//! authorization guard, the incident and confirmation subsystems, and the
//! bulk reconciliation engine — all expressed against the collaborator
//! traits in [`store`], [`artifact`], [`registry`] and [`lookup`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod actor;
pub mod artifact;
pub mod authz;
pub mod confirmation;
pub mod engine;
pub mod error;
pub mod import;
pub mod incident;
pub mod lookup;
pub mod person;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use engine::{Engine, LifecyclePolicy};
pub use error::{Error, Result};
