mod builder;
mod core;

// Re-export public items
pub use self::builder::CollectorBuilder;
pub use self::core::Collector;
