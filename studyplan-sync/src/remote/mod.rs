//! Remote store adapters.
//!
//! `rest` talks to the hosted document backend; `memory` is a full in-process
//! implementation of the same contracts, used by the engine tests and as an
//! offline stand-in.

pub mod memory;
pub mod rest;
