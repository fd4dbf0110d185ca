//! Media durability layer: reference scanning and the budgeted asset store.
//!
//! # Responsibility
//! - Extract `media:<id>` reference tokens from document text.
//! - Persist binary assets under a byte budget with reference-aware
//!   eviction.
//!
//! # Invariants
//! - Eviction is cooperative: only cleanup passes remove assets, and an id
//!   in the caller-supplied used set is never removed.

pub mod scanner;
pub mod store;
