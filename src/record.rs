use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::naming::short_name;

/// Telemetry describing one execution of a function, as produced by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    /// Identifier of this execution attempt
    pub instance_id: Uuid,

    /// Function name, possibly namespace-qualified
    pub function_name: String,

    /// When the execution started
    pub start_time: DateTime<Utc>,

    /// When the execution finished, absent while it is still running
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Why the function was triggered
    #[serde(default)]
    pub trigger_reason: Option<String>,

    /// Invocation arguments rendered as strings
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,

    /// Error description for failed executions
    #[serde(default)]
    pub error_details: Option<String>,

    /// Captured log output
    #[serde(default)]
    pub log_output: Option<String>,

    /// Execution that caused this one, if any. The parent may not exist.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

/// The normalized form of a [`TelemetryRecord`] handed to a log writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableLogItem {
    pub instance_id: Uuid,
    /// Canonical short function name
    pub function_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub trigger_reason: Option<String>,
    pub arguments: BTreeMap<String, String>,
    pub error_details: Option<String>,
    pub log_output: Option<String>,
    pub parent_id: Option<Uuid>,
}

impl From<TelemetryRecord> for DurableLogItem {
    fn from(record: TelemetryRecord) -> Self {
        let function_name = short_name(&record.function_name).to_string();

        Self {
            instance_id: record.instance_id,
            function_name,
            start_time: record.start_time,
            end_time: record.end_time,
            trigger_reason: record.trigger_reason,
            arguments: record.arguments,
            error_details: record.error_details,
            log_output: record.log_output,
            parent_id: record.parent_id,
        }
    }
}
