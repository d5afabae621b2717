pub mod catalog;
pub mod config;
pub mod content;
pub mod database;
pub mod entities;
pub mod errors;
pub mod events;
pub mod imaging;
pub mod job_scheduling;
pub mod models;
pub mod observability;
pub mod plugins;
pub mod rendering;
