pub mod adapter;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod projection;
pub mod tracker;
