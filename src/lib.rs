pub mod app;
pub mod art;
pub mod audio;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod event;
pub mod library;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod playlist;
pub mod ui;
