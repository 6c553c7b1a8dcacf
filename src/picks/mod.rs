pub mod persistence;
pub mod scoring;
pub mod service;
pub mod types;
pub mod validation;
