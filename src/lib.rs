pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod source;
pub mod window;
