pub mod cli;
pub mod config;
pub mod hot_reload;
pub mod manifest;
pub mod startup;
