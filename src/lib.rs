#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod backend;
pub mod config;
pub mod data;
pub mod frame;
pub mod logging;
pub mod state;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, run_with};
