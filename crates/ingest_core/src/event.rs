use chrono::{DateTime, Utc};

/// Timing of one load package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMetric {
    pub load_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A pipeline milestone worth reporting to the chat channel.
///
/// Errors raised by the pipeline are mapped into one of these variants where
/// they are caught, so rendering never depends on the error types themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// Required configuration is absent.
    ConfigMissing {
        spec_name: String,
        missing_fields: Vec<String>,
    },
    /// A pipeline step failed.
    StepFailed {
        pipeline_name: String,
        step: String,
        cause: Option<String>,
        step_info: Option<String>,
        load_id: Option<String>,
    },
    /// A destination table gained columns. Columns keep the caller's order.
    SchemaUpdate {
        table_name: String,
        changed_columns: Vec<String>,
    },
    /// The run completed and every load package was committed.
    RunCompleted {
        pipeline_name: String,
        destination_name: String,
        dataset_name: String,
        per_load_metrics: Vec<LoadMetric>,
    },
    /// Free-form message, optionally with a hint for the reader.
    Generic { message: String, tip: Option<String> },
    /// Settings in effect for the upcoming run, in the caller's order.
    RunConfiguration {
        pipeline_name: String,
        settings: Vec<(String, String)>,
    },
}

impl NotificationEvent {
    pub fn generic(message: impl Into<String>) -> Self {
        NotificationEvent::Generic {
            message: message.into(),
            tip: None,
        }
    }

    /// Short name of the variant, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::ConfigMissing { .. } => "config_missing",
            NotificationEvent::StepFailed { .. } => "step_failed",
            NotificationEvent::SchemaUpdate { .. } => "schema_update",
            NotificationEvent::RunCompleted { .. } => "run_completed",
            NotificationEvent::Generic { .. } => "generic",
            NotificationEvent::RunConfiguration { .. } => "run_configuration",
        }
    }
}
