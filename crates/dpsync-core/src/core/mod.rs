//! Internal implementation modules for `dpsync-core`.
//!
//! Most callers should go through `dpsync_core::api` rather than importing
//! these modules directly.

pub mod client;
pub mod config;
pub mod filter;
pub mod json;
pub mod order;
pub mod project;
pub mod pull;
pub mod push;
pub mod refs;
pub mod transfer;
