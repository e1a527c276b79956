pub mod app;
pub mod grid;

#[cfg(test)]
mod app_test;

pub use app::*;
