use async_trait::async_trait;

use crate::error::Result;
use crate::record::DurableLogItem;

/// PostgreSQL storage implementation
pub mod postgres;
pub use postgres::PostgresStore;

/// In-memory storage for testing
pub mod memory;
pub use memory::MemoryStore;

/// Narrow write interface below the batch writer
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    /// Durably write a batch, returning how many items were written
    async fn write_batch(&self, items: &[DurableLogItem]) -> Result<usize>;

    /// Get a name for this storage backend
    fn name(&self) -> &str;
}
