pub mod config;
pub mod slots;

#[cfg(test)]
mod config_test;

pub use config::*;
pub use slots::*;
