//! Ingest engine: page fetching, loading, notification delivery and the
//! pipeline runner that ties them together.
mod destination;
mod fetch;
mod notify;
mod persist;
mod resource;
mod runner;
mod runtime;
mod telegram;
mod types;

pub use destination::{
    Destination, FailedJob, JsonlDestination, LoadError, LoadPackage, LoadReport, TableBatch,
    TableSchema, TableSchemaUpdate, SCHEMA_FILENAME,
};
pub use fetch::{FetchSettings, PageFetcher, ReqwestPageFetcher};
pub use notify::{
    ChatTransport, Delivery, DisplayOptions, LinkPreviewOptions, NotificationDispatcher,
    SendMessage, TransportError,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PendingFile, PersistError};
pub use resource::{nyc_open_data_resources, ResourceSpec, TableKeys, NYC_OPEN_DATA_BASE_URL};
pub use runner::{
    load_id_for, Clock, PipelineError, PipelineRunner, PipelineSettings, RunSummary, Step,
    StepError,
};
pub use telegram::{TelegramTransport, TELEGRAM_API_BASE};
pub use types::{FailureKind, FetchError};
