pub mod config;
pub mod docker;
pub mod error;
pub mod launcher;
pub mod pipeline;
pub mod port;
pub mod process;
pub mod process_monitor;
pub mod python_env;
pub mod utils;
