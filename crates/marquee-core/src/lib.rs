pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod genres;
pub mod models;
pub mod query;
pub mod storage;
