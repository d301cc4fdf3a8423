//! Ingest core: pagination cursor, lifecycle events and their rendering.
//!
//! Everything in this crate is pure; IO lives in `ingest_engine`.
mod cursor;
mod event;
mod format;
mod interval;

pub use cursor::{CursorError, CursorState, PageRequest, PaginationCursor, StopReason};
pub use event::{LoadMetric, NotificationEvent};
pub use format::{
    escape_html, render, render_default, RenderedMessage, Tier, ABBREVIATED_ITEMS,
    MAX_MESSAGE_LEN,
};
pub use interval::{DateInterval, DEFAULT_SPAN_DAYS};
