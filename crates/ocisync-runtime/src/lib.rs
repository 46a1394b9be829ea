//! Single-container lifecycle management on top of an OCI runtime.
//!
//! The [`container::Container`] controller drives creation and
//! termination through a [`client::RuntimeClient`] and follows the
//! runtime's own state notifications through a [`sync::SyncSession`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod annotation;
pub mod bundle;
pub mod client;
pub mod container;
pub mod sync;
