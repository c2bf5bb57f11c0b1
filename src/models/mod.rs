pub mod config;
pub mod filter;
pub mod log_record;
pub mod rule;
