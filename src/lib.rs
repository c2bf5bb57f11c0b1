//! Client-side log exploration for an HTTP(S) debugging proxy: filtered,
//! paginated retrieval of captured traffic, persisted filters, export and
//! JSON-path rule seeding.

pub mod api;
pub mod filter;
pub mod logs;
pub mod models;
pub mod rules;
pub mod utils;
