pub mod config;
pub mod data;
pub mod events;
pub mod monitoring;
pub mod picks;
