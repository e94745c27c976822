//! Cron normalization and minute truncation helpers.

use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use cron::Schedule;

use logwarden_core::JobName;

use crate::error::RulesError;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub(crate) fn normalize_cron(cron_5field: &str) -> String {
    let trimmed = cron_5field.trim();
    let field_count = trimmed.split_whitespace().count();
    if field_count == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn parse_schedule(job: JobName, expr: &str) -> Result<Schedule, RulesError> {
    Schedule::from_str(&normalize_cron(expr)).map_err(|e| RulesError::InvalidCron {
        job,
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Drop seconds and sub-seconds so a tick at 02:00:42 evaluates as 02:00.
pub fn truncate_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}
