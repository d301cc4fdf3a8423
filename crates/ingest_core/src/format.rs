//! Rendering of [`NotificationEvent`]s into Telegram HTML text.
//!
//! Every message is a header line, a body built from the event's fields in a
//! fixed order, and a footer naming the sending application. When the full
//! rendering is longer than the limit, optional detail is removed tier by
//! tier (see [`Tier`]) until the text fits. The header, the identifiers and
//! the footer survive every tier.

use std::borrow::Cow;
use std::fmt::Write;

use chrono::SecondsFormat;

use crate::event::{LoadMetric, NotificationEvent};

/// Text limit of a Telegram `sendMessage` call.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Number of enumerated items kept from [`Tier::Abbreviated`] on.
pub const ABBREVIATED_ITEMS: usize = 5;

const ERROR_MARKER: &str = "❌";
const WARNING_MARKER: &str = "⚠️";
const DATABASE_MARKER: &str = "⛁";
const GEAR_MARKER: &str = "⚙️";
const INFO_MARKER: &str = "ℹ️";
const TIP_MARKER: &str = "💡";
const ELLIPSIS: char = '…';
/// Section and sender names kept whole while the missing-field list is capped.
const CONTEXT_CHARS_KEPT: usize = 64;

/// How much of an event made it into the text, from most to least complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Everything.
    Full,
    /// Exception, step info, tip and per-load timing blocks removed.
    WithoutDetail,
    /// Enumerations cut to [`ABBREVIATED_ITEMS`] entries.
    Abbreviated,
    /// Header, identifying fields and footer only.
    Minimal,
    /// Minimal with field values shortened to fit.
    Clipped,
}

/// Text ready for delivery; its length never exceeds the limit it was
/// rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    text: String,
    tier: Tier,
}

impl RenderedMessage {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in UTF-8 bytes, which also bounds the character count.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Renders with the Telegram limit.
pub fn render_default(event: &NotificationEvent, app_name: &str) -> RenderedMessage {
    render(event, app_name, MAX_MESSAGE_LEN)
}

/// Renders `event` into at most `limit` bytes.
pub fn render(event: &NotificationEvent, app_name: &str, limit: usize) -> RenderedMessage {
    for tier in [Tier::Full, Tier::WithoutDetail, Tier::Abbreviated, Tier::Minimal] {
        let text = compose(event, app_name, tier, Clip::NONE);
        if text.len() <= limit {
            return RenderedMessage { text, tier };
        }
    }

    // Free text is shortened first, then the names around the body (the
    // config section and the sender), then every identifier. The
    // missing-field list loses entries only when none of that fits.
    let attempts: [fn(usize) -> Clip; 5] = [
        |n| Clip { free_text: Some(n), ..Clip::NONE },
        |n| Clip { context: Some(n), ..Clip::NO_FREE_TEXT },
        |n| Clip { identifiers: Some(n), ..Clip::NO_FREE_TEXT },
        |n| Clip {
            required_items: Some(n),
            context: Some(CONTEXT_CHARS_KEPT),
            ..Clip::NO_FREE_TEXT
        },
        |n| Clip {
            identifiers: Some(n),
            context: None,
            ..Clip::ALL
        },
    ];
    let clipped = attempts.iter().find_map(|clip_with| {
        largest_fitting(limit, |n| compose(event, app_name, Tier::Minimal, clip_with(n)))
    });

    let text = clipped.unwrap_or_else(|| {
        let skeleton = compose(event, app_name, Tier::Minimal, Clip::ALL);
        cut_at_char_boundary(&skeleton, limit).to_string()
    });
    RenderedMessage { text, tier: Tier::Clipped }
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Character caps applied to field values before escaping.
#[derive(Debug, Clone, Copy)]
struct Clip {
    free_text: Option<usize>,
    identifiers: Option<usize>,
    /// Extra cap on the config section name and the app name only.
    context: Option<usize>,
    required_items: Option<usize>,
}

impl Clip {
    const NONE: Clip = Clip {
        free_text: None,
        identifiers: None,
        context: None,
        required_items: None,
    };
    const NO_FREE_TEXT: Clip = Clip {
        free_text: Some(0),
        ..Clip::NONE
    };
    const ALL: Clip = Clip {
        free_text: Some(0),
        identifiers: Some(0),
        context: Some(0),
        required_items: Some(0),
    };
}

struct Composer<'a> {
    out: String,
    tier: Tier,
    clip: Clip,
    app_name: &'a str,
}

impl<'a> Composer<'a> {
    fn new(app_name: &'a str, tier: Tier, clip: Clip) -> Self {
        Self {
            out: String::new(),
            tier,
            clip,
            app_name,
        }
    }

    fn shows_detail(&self) -> bool {
        self.tier == Tier::Full
    }

    fn is_minimal(&self) -> bool {
        self.tier >= Tier::Minimal
    }

    fn item_cap(&self) -> Option<usize> {
        (self.tier >= Tier::Abbreviated).then_some(ABBREVIATED_ITEMS)
    }

    fn ident(&self, value: &str) -> String {
        escape_html(&clip_chars(value, self.clip.identifiers)).into_owned()
    }

    fn context(&self, value: &str) -> String {
        let cap = match (self.clip.identifiers, self.clip.context) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        escape_html(&clip_chars(value, cap)).into_owned()
    }

    fn free(&self, value: &str) -> String {
        escape_html(&clip_chars(value, self.clip.free_text)).into_owned()
    }

    fn header(&mut self, marker: &str, title: &str) {
        let _ = write!(self.out, "{marker} <b>{title}</b>");
    }

    fn labelled(&mut self, label: &str, value: &str) {
        let value = self.ident(value);
        let _ = write!(self.out, "\n{label}: <code>{value}</code>");
    }

    fn code_list(&self, values: &[String], cap: Option<usize>) -> String {
        let (shown, hidden) = split_capped(values, cap);
        let mut list = shown
            .iter()
            .map(|value| format!("<code>{}</code>", self.ident(value)))
            .collect::<Vec<_>>()
            .join(", ");
        if hidden > 0 {
            if !list.is_empty() {
                list.push_str(", ");
            }
            let _ = write!(list, "{ELLIPSIS} and {hidden} more");
        }
        list
    }

    fn block(&mut self, title: &str, content: &str) {
        let _ = write!(self.out, "\n\n<b>{title}</b>\n<pre><code>{content}</code></pre>");
    }

    fn footer(mut self) -> String {
        let app = self.context(self.app_name);
        let _ = write!(self.out, "\n\n<i>Sent by <code>{app}</code></i>.");
        self.out
    }
}

fn compose(event: &NotificationEvent, app_name: &str, tier: Tier, clip: Clip) -> String {
    let mut c = Composer::new(app_name, tier, clip);
    match event {
        NotificationEvent::ConfigMissing {
            spec_name,
            missing_fields,
        } => {
            let spec = c.context(spec_name);
            c.header(ERROR_MARKER, &format!("Missing configuration in <code>{spec}</code>"));
            let fields = c.code_list(missing_fields, c.clip.required_items);
            let _ = write!(c.out, "\n\n<b>Fields missing</b>: {fields}");
        }
        NotificationEvent::StepFailed {
            pipeline_name,
            step,
            cause,
            step_info,
            load_id,
        } => {
            c.header(ERROR_MARKER, "Pipeline failed");
            if c.is_minimal() {
                c.out.push('\n');
                c.labelled("Pipeline", pipeline_name);
                c.labelled("Step", step);
                if let Some(load_id) = load_id {
                    c.labelled("Load ID", load_id);
                }
            } else {
                let (pipeline, step) = (c.ident(pipeline_name), c.ident(step));
                let _ = write!(
                    c.out,
                    "\n\nPipeline <code>{pipeline}</code> failed at step <code>{step}</code>."
                );
                if c.shows_detail() {
                    if let Some(cause) = cause {
                        let cause = c.free(cause);
                        c.block("Exception", &cause);
                    }
                    if let Some(info) = step_info {
                        let info = c.free(info);
                        c.block("Step info", &info);
                    }
                }
                if let Some(load_id) = load_id {
                    let load_id = c.ident(load_id);
                    c.block("Load ID", &load_id);
                }
            }
        }
        NotificationEvent::SchemaUpdate {
            table_name,
            changed_columns,
        } => {
            c.header(WARNING_MARKER, "Schema update");
            if c.is_minimal() {
                c.out.push('\n');
                c.labelled("Table", table_name);
                let columns = c.code_list(changed_columns, Some(ABBREVIATED_ITEMS));
                let _ = write!(c.out, "\nColumns: {columns}");
            } else {
                let table = c.ident(table_name);
                let _ = write!(
                    c.out,
                    "\n\nTable <code>{table}</code> changed its schema.\n\n<b>Columns</b>"
                );
                let (shown, hidden) = split_capped(changed_columns, c.item_cap());
                for column in shown {
                    let column = c.ident(column);
                    let _ = write!(c.out, "\n<code>{column}</code>");
                }
                if hidden > 0 {
                    let _ = write!(c.out, "\n{ELLIPSIS} and {hidden} more");
                }
            }
        }
        NotificationEvent::RunCompleted {
            pipeline_name,
            destination_name,
            dataset_name,
            per_load_metrics,
        } => {
            c.header(DATABASE_MARKER, "Load info");
            if c.is_minimal() {
                c.out.push('\n');
                c.labelled("Pipeline", pipeline_name);
                c.labelled("Destination", destination_name);
                c.labelled("Dataset", dataset_name);
                if !per_load_metrics.is_empty() {
                    let ids: Vec<String> =
                        per_load_metrics.iter().map(|m| m.load_id.clone()).collect();
                    let loads = c.code_list(&ids, Some(ABBREVIATED_ITEMS));
                    let _ = write!(c.out, "\nLoads: {loads}");
                }
            } else {
                let (pipeline, destination, dataset) = (
                    c.ident(pipeline_name),
                    c.ident(destination_name),
                    c.ident(dataset_name),
                );
                let _ = write!(
                    c.out,
                    "\n\nPipeline <code>{pipeline}</code> for destination <code>{destination}</code>, dataset <code>{dataset}</code>, ran to completion."
                );
                let (shown, hidden) = split_capped(per_load_metrics, c.item_cap());
                for (index, metric) in shown.iter().enumerate() {
                    let load_id = c.ident(&metric.load_id);
                    let _ = write!(c.out, "\n\n<b>Load {}</b>\n<code>{load_id}</code>", index + 1);
                    if c.shows_detail() {
                        let timing = timing_block(metric);
                        let _ = write!(c.out, "\n<pre><code>{timing}</code></pre>");
                    }
                }
                if hidden > 0 {
                    let _ = write!(c.out, "\n\n{ELLIPSIS} and {hidden} more loads");
                }
            }
        }
        NotificationEvent::Generic { message, tip } => {
            c.header(INFO_MARKER, "Notice");
            let message = c.free(message);
            let _ = write!(c.out, "\n\n<pre><code>{message}</code></pre>");
            if c.shows_detail() {
                if let Some(tip) = tip {
                    let tip = c.free(tip);
                    let _ = write!(c.out, "\n\n{TIP_MARKER} <b>Tip</b>\n{tip}");
                }
            }
        }
        NotificationEvent::RunConfiguration {
            pipeline_name,
            settings,
        } => {
            c.header(GEAR_MARKER, "Run configuration");
            if c.is_minimal() {
                c.out.push('\n');
                c.labelled("Pipeline", pipeline_name);
            } else {
                let pipeline = c.ident(pipeline_name);
                let _ = write!(c.out, "\n\nPipeline <code>{pipeline}</code>\n\n<b>Settings</b>");
                let (shown, hidden) = split_capped(settings, c.item_cap());
                for (key, value) in shown {
                    let (key, value) = (c.ident(key), c.free(value));
                    let _ = write!(c.out, "\n{key}: <code>{value}</code>");
                }
                if hidden > 0 {
                    let _ = write!(c.out, "\n{ELLIPSIS} and {hidden} more");
                }
            }
        }
    }
    c.footer()
}

fn timing_block(metric: &LoadMetric) -> String {
    let seconds = (metric.finished_at - metric.started_at).num_milliseconds() as f64 / 1000.0;
    format!(
        "started_at: {}\nfinished_at: {}\nduration: {seconds:.2}s",
        metric.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        metric.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn split_capped<T>(items: &[T], cap: Option<usize>) -> (&[T], usize) {
    match cap {
        Some(cap) if items.len() > cap => (&items[..cap], items.len() - cap),
        _ => (items, 0),
    }
}

fn clip_chars(value: &str, max_chars: Option<usize>) -> Cow<'_, str> {
    match max_chars {
        Some(max) if value.chars().count() > max => {
            let mut clipped: String = value.chars().take(max).collect();
            clipped.push(ELLIPSIS);
            Cow::Owned(clipped)
        }
        _ => Cow::Borrowed(value),
    }
}

/// Largest cap `n` in `0..=limit` whose composition fits, if any fits.
fn largest_fitting(limit: usize, compose_with: impl Fn(usize) -> String) -> Option<String> {
    let mut best = None;
    let (mut low, mut high) = (0usize, limit);
    while low <= high {
        let mid = low + (high - low) / 2;
        let text = compose_with(mid);
        if text.len() <= limit {
            best = Some(text);
            low = mid + 1;
        } else if mid == 0 {
            break;
        } else {
            high = mid - 1;
        }
    }
    best
}

fn cut_at_char_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
