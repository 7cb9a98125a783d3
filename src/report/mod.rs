//! Report assembly and output.

pub mod format;
pub mod generator;

pub use format::Presentation;
pub use generator::{render, write_report};
