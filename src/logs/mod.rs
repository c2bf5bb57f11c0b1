pub mod engine;
pub mod export;
pub mod frames;
pub mod session;
pub mod window;
