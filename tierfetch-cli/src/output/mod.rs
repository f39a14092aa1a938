//! Output formatting for CLI.

mod json;
mod text;

pub use json::{JsonFormatter, RobotsOutput};
pub use text::TextFormatter;
