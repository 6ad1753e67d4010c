pub mod app;
pub mod cli;
pub mod collapse;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod group;
pub mod loader;
pub mod logging;
pub mod matcher;
pub mod notification;
pub mod overrides;
pub mod parser;
pub mod record;
pub mod statistics;
pub mod tailer;
pub mod ui;
pub mod utils;
pub mod viewport;
