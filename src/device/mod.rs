pub mod ua_parser;

pub use ua_parser::{client_metadata, describe, parse_user_agent};
