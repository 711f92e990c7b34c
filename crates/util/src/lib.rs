pub mod config;
pub mod text_processing;

pub use config::*;
pub use text_processing::*;
