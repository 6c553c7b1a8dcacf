pub mod cache;
pub mod source;
pub mod types;
