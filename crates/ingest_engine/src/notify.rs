//! Best-effort delivery of rendered notifications.
//!
//! Delivery is diagnostic only. [`NotificationDispatcher::send`] makes a
//! single attempt and absorbs every failure, panics included, so a lost
//! message can never change the outcome of a pipeline run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use ingest_core::{render_default, NotificationEvent, RenderedMessage};
use ingest_logging::{ingest_debug, ingest_error, ingest_warn};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkPreviewOptions {
    pub is_disabled: bool,
    pub show_above_text: bool,
}

/// How the chat client shows a message. Built explicitly and passed by
/// reference; never shared mutably between sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOptions {
    pub parse_mode: String,
    pub disable_notification: bool,
    pub link_preview: LinkPreviewOptions,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            parse_mode: "HTML".to_string(),
            disable_notification: true,
            link_preview: LinkPreviewOptions {
                is_disabled: false,
                show_above_text: false,
            },
        }
    }
}

/// JSON body of a Bot API `sendMessage` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    pub parse_mode: &'a str,
    pub disable_notification: bool,
    pub link_preview_options: LinkPreviewOptions,
}

impl<'a> SendMessage<'a> {
    pub fn new(chat_id: &'a str, message: &'a RenderedMessage, options: &'a DisplayOptions) -> Self {
        Self {
            chat_id,
            text: message.text(),
            parse_mode: &options.parse_mode,
            disable_notification: options.disable_notification,
            link_preview_options: options.link_preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The chat API answered with a non-2xx status.
    #[error("chat api responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// True for failures attributable to the channel itself.
    pub fn is_transport_level(&self) -> bool {
        matches!(self, TransportError::Status { .. })
    }
}

/// Posts one message to the chat API.
pub trait ChatTransport {
    fn post_message(&self, message: &SendMessage<'_>) -> Result<(), TransportError>;
}

/// What happened to one send. Informational; callers must not branch
/// pipeline behavior on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Logged at warn.
    TransportFailed(TransportError),
    /// Logged at error.
    Failed(String),
}

pub struct NotificationDispatcher {
    transport: Box<dyn ChatTransport>,
    chat_id: String,
    options: DisplayOptions,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Box<dyn ChatTransport>,
        chat_id: impl Into<String>,
        options: DisplayOptions,
    ) -> Self {
        Self {
            transport,
            chat_id: chat_id.into(),
            options,
        }
    }

    pub fn options(&self) -> &DisplayOptions {
        &self.options
    }

    /// Renders `event` and sends it.
    pub fn notify(&self, event: &NotificationEvent, app_name: &str) -> Delivery {
        let message = render_default(event, app_name);
        ingest_debug!(
            "notify {} ({} bytes, {:?})",
            event.kind(),
            message.len(),
            message.tier()
        );
        self.send(&message)
    }

    /// Sends with the dispatcher's own display options.
    pub fn send(&self, message: &RenderedMessage) -> Delivery {
        self.send_with_options(message, &self.options)
    }

    /// Single delivery attempt; never fails and never panics outward.
    pub fn send_with_options(&self, message: &RenderedMessage, options: &DisplayOptions) -> Delivery {
        let payload = SendMessage::new(&self.chat_id, message, options);
        ingest_debug!("send text to chat {}", self.chat_id);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.transport.post_message(&payload)));
        match outcome {
            Ok(Ok(())) => Delivery::Sent,
            Ok(Err(err)) if err.is_transport_level() => {
                ingest_warn!("notification to chat {} rejected: {}", self.chat_id, err);
                Delivery::TransportFailed(err)
            }
            Ok(Err(err)) => {
                ingest_error!("notification to chat {} failed: {}", self.chat_id, err);
                Delivery::Failed(err.to_string())
            }
            Err(panic_payload) => {
                let reason = panic_message(panic_payload.as_ref());
                ingest_error!("notification transport panicked: {}", reason);
                Delivery::Failed(reason)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
