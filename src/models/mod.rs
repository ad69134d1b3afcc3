//! Domain models for authproxy
//!
//! This module contains the core value types shared by the backends and
//! the access policy.

pub mod string_set;

pub use string_set::StringSet;
