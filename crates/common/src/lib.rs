pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod retry;
pub mod task;
pub mod token;
pub mod types;
