pub mod config;
pub mod downstream;
pub mod ingest;
pub mod logger;
pub mod pages;
pub mod state;
