use chrono::{Days, NaiveDate};

/// Span used when only one end of the window is known.
pub const DEFAULT_SPAN_DAYS: u64 = 30;

/// Inclusive date window used to filter resources by creation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub stop: NaiveDate,
}

impl DateInterval {
    /// Fills in whichever end is missing.
    ///
    /// - both given: used as is
    /// - neither: the `span_days` ending `today`
    /// - only `stop`: the `span_days` ending at `stop`
    /// - only `start`: the `span_days` starting at `start`
    pub fn resolve(
        start: Option<NaiveDate>,
        stop: Option<NaiveDate>,
        span_days: u64,
        today: NaiveDate,
    ) -> Self {
        let span = Days::new(span_days);
        match (start, stop) {
            (Some(start), Some(stop)) => Self { start, stop },
            (None, None) => Self {
                start: today.checked_sub_days(span).unwrap_or(NaiveDate::MIN),
                stop: today,
            },
            (None, Some(stop)) => Self {
                start: stop.checked_sub_days(span).unwrap_or(NaiveDate::MIN),
                stop,
            },
            (Some(start), None) => Self {
                start,
                stop: start.checked_add_days(span).unwrap_or(NaiveDate::MAX),
            },
        }
    }

    /// SoQL predicate selecting rows whose `column` falls in the window.
    pub fn between_predicate(&self, column: &str) -> String {
        format!(
            "{column} between '{}' and '{}'",
            self.start.format("%Y-%m-%d"),
            self.stop.format("%Y-%m-%d")
        )
    }
}
