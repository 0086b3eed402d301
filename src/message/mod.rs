//! Parsing of subprocess output lines into typed messages

mod parser;

pub use parser::parse_line;
