pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod store;
pub mod tui;
pub mod ui;
