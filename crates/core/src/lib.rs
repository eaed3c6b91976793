//! Bazaar Core - Shared domain types.
//!
//! This crate provides common types used across all Bazaar components:
//! - `server` - Storefront, seller dashboard and platform admin HTTP API
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and rules - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, slugs and prices, status
//!   enums with their transition rules, list reordering and pagination

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
