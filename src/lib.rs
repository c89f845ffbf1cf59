pub mod capabilities;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod loader;
pub mod notify;
pub mod resolver;
pub mod session;
pub mod specifier;
