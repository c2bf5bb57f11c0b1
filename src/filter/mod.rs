pub mod preferences;
pub mod search;
pub mod store;
