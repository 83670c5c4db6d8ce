pub mod parser;
pub mod types;

pub use parser::ReplyParser;
pub use types::Value;
