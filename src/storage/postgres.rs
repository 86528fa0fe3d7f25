use async_trait::async_trait;
use deadpool_postgres::Pool;
use log::{debug, info, trace};

use crate::config::{WriterConfig, is_valid_table_name};
use crate::error::{LogError, Result};
use crate::record::DurableLogItem;
use crate::storage::LogStore;

/// Writes log items to a PostgreSQL table, one transaction per batch.
///
/// Rows are keyed on `instance_id`: the completion record of an execution
/// replaces the row written when it started.
pub struct PostgresStore {
    pool: Pool,
    host_name: String,
    container_name: String,
    insert_sql: String,
    name: String,
}

impl PostgresStore {
    /// Create a store bound to a host and container, creating the table if configured
    pub async fn new(
        pool: Pool,
        config: &WriterConfig,
        host_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Result<Self> {
        if !is_valid_table_name(&config.table) {
            return Err(LogError::Config(format!("Invalid table name: {}", config.table)));
        }

        if config.create_table {
            let client = pool.get().await?;
            for sql in create_table_sql(&config.table) {
                debug!("Creating log table with SQL: {}", sql);
                client.batch_execute(&sql).await?;
            }
            info!("Log table {} is ready", config.table);
        }

        Ok(Self {
            pool,
            host_name: host_name.into(),
            container_name: container_name.into(),
            insert_sql: insert_sql(&config.table),
            name: format!("postgres:{}", config.table),
        })
    }
}

#[async_trait]
impl LogStore for PostgresStore {
    async fn write_batch(&self, items: &[DurableLogItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let stmt = tx.prepare_cached(&self.insert_sql).await?;

        for item in items {
            let arguments = serde_json::to_string(&item.arguments)?;

            tx.execute(
                &stmt,
                &[
                    &self.host_name,
                    &self.container_name,
                    &item.instance_id,
                    &item.function_name,
                    &item.start_time,
                    &item.end_time,
                    &item.trigger_reason,
                    &arguments,
                    &item.error_details,
                    &item.log_output,
                    &item.parent_id,
                ],
            )
            .await?;
        }

        tx.commit().await?;

        trace!("Wrote {} log items to {}", items.len(), self.name);
        Ok(items.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// DDL for the log table and its lookup indexes
pub fn create_table_sql(table: &str) -> Vec<String> {
    let index_prefix = table.replace('.', "_");

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                instance_id UUID PRIMARY KEY,
                host_name TEXT NOT NULL,
                container_name TEXT NOT NULL,
                function_name TEXT NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ,
                trigger_reason TEXT,
                arguments TEXT NOT NULL,
                error_details TEXT,
                log_output TEXT,
                parent_id UUID,
                written_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_function_start ON {} (function_name, start_time)",
            index_prefix, table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_container ON {} (host_name, container_name)",
            index_prefix, table
        ),
    ]
}

/// Upsert statement taking the eleven item columns in order
pub fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (host_name, container_name, instance_id, function_name, start_time, \
         end_time, trigger_reason, arguments, error_details, log_output, parent_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (instance_id) DO UPDATE SET \
         host_name = EXCLUDED.host_name, \
         container_name = EXCLUDED.container_name, \
         function_name = EXCLUDED.function_name, \
         start_time = EXCLUDED.start_time, \
         end_time = EXCLUDED.end_time, \
         trigger_reason = EXCLUDED.trigger_reason, \
         arguments = EXCLUDED.arguments, \
         error_details = EXCLUDED.error_details, \
         log_output = EXCLUDED.log_output, \
         parent_id = EXCLUDED.parent_id, \
         written_at = NOW()",
        table
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, TlsConfig};
    use crate::connection;

    #[test]
    fn test_insert_sql_binds_every_column() {
        let sql = insert_sql("function_logs");
        assert!(sql.starts_with("INSERT INTO function_logs ("));
        assert!(sql.contains("$11"));
        assert!(!sql.contains("$12"));
        assert!(sql.contains("ON CONFLICT (instance_id)"));
    }

    #[test]
    fn test_create_table_sql_uses_schema_safe_index_names() {
        let statements = create_table_sql("telemetry.function_logs");
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS telemetry.function_logs"));
        assert!(statements[1].contains("idx_telemetry_function_logs_function_start"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_table_before_connecting() {
        let pool = connection::connect(&ConnectionConfig {
            connection_string: "host=127.0.0.1 port=1 sslmode=disable".to_string(),
            verify: false,
            pool_size: 1,
            tls: TlsConfig::default(),
        })
        .await
        .unwrap();

        let config = WriterConfig {
            table: "logs;--".to_string(),
            ..Default::default()
        };

        let result = PostgresStore::new(pool, &config, "host", "scope").await;
        assert!(matches!(result, Err(LogError::Config(_))));
    }
}
