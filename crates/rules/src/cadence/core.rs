//! [`CadenceTable`]: the pure minute → jobs function.

use chrono::{DateTime, FixedOffset, Utc};

use logwarden_core::JobName;

use crate::error::RulesError;

use super::cron::{parse_schedule, truncate_to_minute};
use super::entry::CadenceEntry;

/// The production cadence, in dispatch order.
pub const STANDARD_CADENCE: [(JobName, &str); 6] = [
    (JobName::CollectLogs, "*/5 * * * *"),
    (JobName::AnalyzeLogs, "*/15 * * * *"),
    (JobName::DetectIssues, "5,20,35,50 * * * *"),
    (JobName::PredictIssues, "0 * * * *"),
    (JobName::SendDigest, "0 8 * * *"),
    (JobName::CleanupData, "0 2 * * *"),
];

/// Cron rules evaluated in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct CadenceTable {
    entries: Vec<CadenceEntry>,
    offset: FixedOffset,
}

impl CadenceTable {
    /// The standard cadence evaluated at `offset`.
    pub fn standard(offset: FixedOffset) -> Result<Self, RulesError> {
        Self::from_rules(&STANDARD_CADENCE, offset)
    }

    /// Build a table from `(job, 5-field cron)` pairs. Order is dispatch order.
    pub fn from_rules(rules: &[(JobName, &str)], offset: FixedOffset) -> Result<Self, RulesError> {
        let entries = rules
            .iter()
            .map(|(job, expr)| {
                Ok(CadenceEntry {
                    job: *job,
                    cron: expr.to_string(),
                    schedule: parse_schedule(*job, expr)?,
                })
            })
            .collect::<Result<Vec<_>, RulesError>>()?;
        Ok(Self { entries, offset })
    }

    pub fn entries(&self) -> &[CadenceEntry] {
        &self.entries
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Jobs whose rule matches the minute containing `now`, in table order.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<JobName> {
        let local = truncate_to_minute(now).with_timezone(&self.offset);
        self.entries
            .iter()
            .filter(|entry| entry.schedule.includes(local))
            .map(|entry| entry.job)
            .collect()
    }

    /// First firing of `job` strictly after `after`.
    pub fn next_fire(&self, job: JobName, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let entry = self.entries.iter().find(|e| e.job == job)?;
        entry
            .schedule
            .after(&after.with_timezone(&self.offset))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// The next `n` firings across all jobs, ordered by time then table order.
    pub fn upcoming(&self, after: DateTime<Utc>, n: usize) -> Vec<(DateTime<Utc>, JobName)> {
        let local = after.with_timezone(&self.offset);
        let mut fires: Vec<(DateTime<Utc>, usize, JobName)> = self
            .entries
            .iter()
            .enumerate()
            .flat_map(|(idx, entry)| {
                entry
                    .schedule
                    .after(&local)
                    .take(n)
                    .map(move |t| (t.with_timezone(&Utc), idx, entry.job))
            })
            .collect();
        fires.sort_by_key(|(t, idx, _)| (*t, *idx));
        fires
            .into_iter()
            .take(n)
            .map(|(t, _, job)| (t, job))
            .collect()
    }
}
