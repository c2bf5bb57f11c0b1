pub mod blocked;
pub mod client;
pub mod query;
