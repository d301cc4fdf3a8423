//! Application configuration.
//!
//! Settings come from a RON file; secrets may instead come from the
//! environment (a `.env` file is honored by the binary). Required fields are
//! checked per section so every missing one is reported at once.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ingest_core::{DateInterval, NotificationEvent, DEFAULT_SPAN_DAYS};
use ingest_engine::{
    DisplayOptions, LinkPreviewOptions, PipelineSettings, NYC_OPEN_DATA_BASE_URL,
    TELEGRAM_API_BASE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SOCRATA_TOKEN_VAR: &str = "SOCRATA_APPLICATION_TOKEN";
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_VAR: &str = "TELEGRAM_CHAT_ID";

/// Largest known row count among the resources (311 service requests,
/// 2024-08-09). Pagination never goes past it.
pub const DEFAULT_MAX_OFFSET: u64 = 37_189_770;
pub const DEFAULT_PAGE_LIMIT: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("missing configuration in {spec_name}: {}", fields.join(", "))]
    Missing {
        spec_name: String,
        fields: Vec<String>,
    },
    #[error("invalid date {value:?} for {field}, expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },
}

impl ConfigError {
    /// Only missing fields are worth a chat message; the rest are operator
    /// mistakes visible in the log.
    pub fn to_event(&self) -> Option<NotificationEvent> {
        match self {
            ConfigError::Missing { spec_name, fields } => Some(NotificationEvent::ConfigMissing {
                spec_name: spec_name.clone(),
                missing_fields: fields.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocrataSection {
    pub base_url: String,
    pub application_token: Option<String>,
    pub page_limit: u64,
    pub start_offset: u64,
    pub max_offset: u64,
}

impl Default for SocrataSection {
    fn default() -> Self {
        Self {
            base_url: NYC_OPEN_DATA_BASE_URL.to_string(),
            application_token: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            start_offset: 0,
            max_offset: DEFAULT_MAX_OFFSET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub api_base: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub parse_mode: String,
    pub disable_notification: bool,
    pub disable_link_preview: bool,
    pub link_preview_above_text: bool,
}

impl Default for TelegramSection {
    fn default() -> Self {
        let options = DisplayOptions::default();
        Self {
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token: None,
            chat_id: None,
            parse_mode: options.parse_mode,
            disable_notification: options.disable_notification,
            disable_link_preview: options.link_preview.is_disabled,
            link_preview_above_text: options.link_preview.show_above_text,
        }
    }
}

/// Created-date window for the 311 resource. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub start_date: Option<String>,
    pub stop_date: Option<String>,
    pub span_days: u64,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            start_date: None,
            stop_date: None,
            span_days: DEFAULT_SPAN_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_name: String,
    pub pipeline_name: String,
    pub dataset_name: String,
    pub output_dir: PathBuf,
    pub socrata: SocrataSection,
    pub telegram: TelegramSection,
    pub window: WindowSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Open Data Projects".to_string(),
            pipeline_name: "nyc_open_data".to_string(),
            dataset_name: "landing_zone".to_string(),
            output_dir: PathBuf::from("./data"),
            socrata: SocrataSection::default(),
            telegram: TelegramSection::default(),
            window: WindowSection::default(),
        }
    }
}

/// Credentials needed to post to the chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramTarget {
    pub bot_token: String,
    pub chat_id: String,
}

impl AppConfig {
    /// Reads `path` if given, otherwise starts from the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        ron::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Fills secrets from `lookup` (the process environment in the binary).
    /// Non-empty values override the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(token) = var(SOCRATA_TOKEN_VAR) {
            self.socrata.application_token = Some(token);
        }
        if let Some(token) = var(TELEGRAM_TOKEN_VAR) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = var(TELEGRAM_CHAT_VAR) {
            self.telegram.chat_id = Some(chat_id);
        }
    }

    pub fn socrata_token(&self) -> Result<String, ConfigError> {
        match present(&self.socrata.application_token) {
            Some(token) => Ok(token),
            None => Err(missing("socrata", &["application_token"])),
        }
    }

    pub fn telegram_target(&self) -> Result<TelegramTarget, ConfigError> {
        let bot_token = present(&self.telegram.bot_token);
        let chat_id = present(&self.telegram.chat_id);
        match (bot_token, chat_id) {
            (Some(bot_token), Some(chat_id)) => Ok(TelegramTarget { bot_token, chat_id }),
            (bot_token, chat_id) => {
                let mut fields = Vec::new();
                if bot_token.is_none() {
                    fields.push("bot_token");
                }
                if chat_id.is_none() {
                    fields.push("chat_id");
                }
                Err(missing("telegram", &fields))
            }
        }
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            parse_mode: self.telegram.parse_mode.clone(),
            disable_notification: self.telegram.disable_notification,
            link_preview: LinkPreviewOptions {
                is_disabled: self.telegram.disable_link_preview,
                show_above_text: self.telegram.link_preview_above_text,
            },
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            pipeline_name: self.pipeline_name.clone(),
            app_name: self.app_name.clone(),
            page_limit: self.socrata.page_limit,
            start_offset: self.socrata.start_offset,
            max_offset: self.socrata.max_offset,
        }
    }

    pub fn date_window(&self, today: NaiveDate) -> Result<DateInterval, ConfigError> {
        let start = parse_date("window.start_date", self.window.start_date.as_deref())?;
        let stop = parse_date("window.stop_date", self.window.stop_date.as_deref())?;
        Ok(DateInterval::resolve(start, stop, self.window.span_days, today))
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn missing(spec_name: &str, fields: &[&str]) -> ConfigError {
    ConfigError::Missing {
        spec_name: spec_name.to_string(),
        fields: fields.iter().map(|f| f.to_string()).collect(),
    }
}

fn parse_date(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, ConfigError> {
    value
        .map(|text| {
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
                ConfigError::InvalidDate {
                    field,
                    value: text.to_string(),
                }
            })
        })
        .transpose()
}
