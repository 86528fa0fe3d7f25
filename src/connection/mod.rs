//! Backend connection setup
pub mod postgres;

pub use postgres::{connect, create_pool, parse_connection_string, verify_pool};
