use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ingest_core::{CursorError, LoadMetric, NotificationEvent, PaginationCursor, StopReason};
use ingest_logging::{ingest_error, ingest_info, ingest_warn};
use thiserror::Error;

use crate::destination::{Destination, FailedJob, LoadError};
use crate::fetch::PageFetcher;
use crate::notify::NotificationDispatcher;
use crate::resource::ResourceSpec;
use crate::FetchError;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Extract,
    Load,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Extract => "extract",
            Step::Load => "load",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing configuration in {spec_name}: {}", fields.join(", "))]
    ConfigMissing { spec_name: String, fields: Vec<String> },
    #[error("pipeline failed at step {step}: {source}")]
    StepFailed {
        step: Step,
        load_id: Option<String>,
        step_info: Option<String>,
        #[source]
        source: StepError,
    },
    #[error("{} load job(s) failed in load {load_id}", jobs.len())]
    DestinationFailedJobs { load_id: String, jobs: Vec<FailedJob> },
}

impl PipelineError {
    /// The notification reporting this error.
    pub fn to_event(&self, pipeline_name: &str) -> NotificationEvent {
        match self {
            PipelineError::ConfigMissing { spec_name, fields } => NotificationEvent::ConfigMissing {
                spec_name: spec_name.clone(),
                missing_fields: fields.clone(),
            },
            PipelineError::StepFailed {
                step,
                load_id,
                step_info,
                source,
            } => NotificationEvent::StepFailed {
                pipeline_name: pipeline_name.to_string(),
                step: step.to_string(),
                cause: Some(source.to_string()),
                step_info: step_info.clone(),
                load_id: load_id.clone(),
            },
            PipelineError::DestinationFailedJobs { load_id, jobs } => {
                let mut message = format!("{} load job(s) failed in load {load_id}", jobs.len());
                for job in jobs {
                    message.push_str(&format!("\n{}: {}", job.table, job.message));
                }
                NotificationEvent::Generic {
                    message,
                    tip: Some(
                        "The other tables were committed. Fix the destination and run the pipeline again."
                            .to_string(),
                    ),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub pipeline_name: String,
    pub app_name: String,
    pub page_limit: u64,
    pub start_offset: u64,
    /// Best known upper bound on any resource's row count.
    pub max_offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub metric: LoadMetric,
    /// Rows extracted per resource, in resource order.
    pub rows_per_table: Vec<(String, usize)>,
    pub rows_loaded: usize,
    pub schema_updates: usize,
}

/// Load ids are the load start time as `seconds.micros` since the epoch.
pub fn load_id_for(started_at: DateTime<Utc>) -> String {
    format!(
        "{}.{:06}",
        started_at.timestamp(),
        started_at.timestamp_subsec_micros()
    )
}

/// Runs extract and load for a set of resources and reports each lifecycle
/// event, in order: run configuration, then failure or completion, then one
/// schema update per changed table.
///
/// Pipeline errors are returned after a notification attempt; notification
/// failures never surface here.
pub struct PipelineRunner {
    settings: PipelineSettings,
    resources: Vec<ResourceSpec>,
    fetcher: Box<dyn PageFetcher>,
    destination: Box<dyn Destination>,
    notifier: NotificationDispatcher,
    clock: Clock,
}

impl PipelineRunner {
    pub fn new(
        settings: PipelineSettings,
        resources: Vec<ResourceSpec>,
        fetcher: Box<dyn PageFetcher>,
        destination: Box<dyn Destination>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            settings,
            resources,
            fetcher,
            destination,
            notifier,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let started_at = (self.clock)();
        let load_id = load_id_for(started_at);
        ingest_info!(
            "pipeline {} starting load {}",
            self.settings.pipeline_name,
            load_id
        );

        self.notify(&NotificationEvent::RunConfiguration {
            pipeline_name: self.settings.pipeline_name.clone(),
            settings: self.describe(),
        });

        if let Err(source) = self.destination.begin(&load_id) {
            let err = self.load_failed(&load_id, source);
            return Err(self.report_failure(err));
        }

        let mut rows_per_table = Vec::with_capacity(self.resources.len());
        for resource in self.resources.clone() {
            match self.extract_resource(&resource, &load_id) {
                Ok(rows) => rows_per_table.push((resource.name, rows)),
                Err(err) => {
                    self.destination.abort();
                    return Err(self.report_failure(err));
                }
            }
        }

        let report = match self.destination.finish() {
            Ok(report) => report,
            Err(source) => {
                let err = self.load_failed(&load_id, source);
                return Err(self.report_failure(err));
            }
        };

        let metric = LoadMetric {
            load_id: load_id.clone(),
            started_at,
            finished_at: (self.clock)(),
        };
        ingest_info!(
            "pipeline {} loaded {} rows in load {}",
            self.settings.pipeline_name,
            report.rows_loaded,
            load_id
        );
        self.notify(&NotificationEvent::RunCompleted {
            pipeline_name: self.settings.pipeline_name.clone(),
            destination_name: self.destination.name().to_string(),
            dataset_name: self.destination.dataset().to_string(),
            per_load_metrics: vec![metric.clone()],
        });

        for update in &report.schema_updates {
            self.notify(&NotificationEvent::SchemaUpdate {
                table_name: update.table.clone(),
                changed_columns: update.new_columns.clone(),
            });
        }

        if !report.failed_jobs.is_empty() {
            return Err(self.report_failure(PipelineError::DestinationFailedJobs {
                load_id,
                jobs: report.failed_jobs,
            }));
        }

        Ok(RunSummary {
            metric,
            rows_per_table,
            rows_loaded: report.rows_loaded,
            schema_updates: report.schema_updates.len(),
        })
    }

    /// Pages through one resource, handing each page to the destination as
    /// soon as it arrives. Returns the number of rows extracted.
    fn extract_resource(
        &mut self,
        resource: &ResourceSpec,
        load_id: &str,
    ) -> Result<usize, PipelineError> {
        let step_failed = |step: Step, step_info: String, source: StepError| {
            PipelineError::StepFailed {
                step,
                load_id: Some(load_id.to_string()),
                step_info: Some(step_info),
                source,
            }
        };

        let mut cursor = PaginationCursor::starting_at(
            self.settings.start_offset,
            self.settings.page_limit,
            self.settings.max_offset,
        )
        .map_err(|err| step_failed(Step::Extract, format!("resource {}", resource.name), err.into()))?;
        self.destination
            .declare_table(&resource.name, &resource.keys)
            .map_err(|err| step_failed(Step::Load, format!("resource {}", resource.name), err.into()))?;

        let mut rows = 0;
        while let Some(request) = cursor.next_request() {
            let at = || format!("resource {} at offset {}", resource.name, request.offset);
            let page = self
                .fetcher
                .fetch_page(resource, request)
                .map_err(|err| step_failed(Step::Extract, at(), err.into()))?;
            self.destination
                .write_page(&resource.name, &page)
                .map_err(|err| step_failed(Step::Load, at(), err.into()))?;
            rows += page.len();
            cursor.advance(page.len());
        }

        let state = cursor.state();
        match cursor.stop_reason() {
            Some(StopReason::ShortPage { item_count }) => ingest_info!(
                "stop paginating {}: page returned fewer items than limit ({} < {})",
                resource.name,
                item_count,
                state.limit
            ),
            Some(StopReason::MaxOffset) => ingest_warn!(
                "stop paginating {}: reached maximum offset {}; rows past it were not fetched",
                resource.name,
                state.max_offset
            ),
            None => {}
        }
        ingest_info!("extracted {} rows from {}", rows, resource.name);
        Ok(rows)
    }

    fn load_failed(&self, load_id: &str, source: LoadError) -> PipelineError {
        PipelineError::StepFailed {
            step: Step::Load,
            load_id: Some(load_id.to_string()),
            step_info: Some(format!(
                "destination {} dataset {}",
                self.destination.name(),
                self.destination.dataset()
            )),
            source: source.into(),
        }
    }

    fn describe(&self) -> Vec<(String, String)> {
        let resources = self
            .resources
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            ("destination".to_string(), self.destination.name().to_string()),
            ("dataset".to_string(), self.destination.dataset().to_string()),
            ("resources".to_string(), resources),
            ("page_limit".to_string(), self.settings.page_limit.to_string()),
            ("start_offset".to_string(), self.settings.start_offset.to_string()),
            ("max_offset".to_string(), self.settings.max_offset.to_string()),
        ]
    }

    fn report_failure(&self, err: PipelineError) -> PipelineError {
        ingest_error!("pipeline {} failed: {}", self.settings.pipeline_name, err);
        self.notify(&err.to_event(&self.settings.pipeline_name));
        err
    }

    fn notify(&self, event: &NotificationEvent) {
        // Delivery outcomes are logged by the dispatcher.
        let _ = self.notifier.notify(event, &self.settings.app_name);
    }
}
