use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    CollectLogs,
    AnalyzeLogs,
    DetectIssues,
    PredictIssues,
    SendDigest,
    CleanupData,
    /// Triggered by the deployment pipeline, never by the cadence.
    AnalyzeE2eResults,
}

impl JobName {
    /// Cadence jobs in dispatch order.
    pub const SCHEDULED: [JobName; 6] = [
        JobName::CollectLogs,
        JobName::AnalyzeLogs,
        JobName::DetectIssues,
        JobName::PredictIssues,
        JobName::SendDigest,
        JobName::CleanupData,
    ];

    pub const ALL: [JobName; 7] = [
        JobName::CollectLogs,
        JobName::AnalyzeLogs,
        JobName::DetectIssues,
        JobName::PredictIssues,
        JobName::SendDigest,
        JobName::CleanupData,
        JobName::AnalyzeE2eResults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::CollectLogs => "collect-logs",
            JobName::AnalyzeLogs => "analyze-logs",
            JobName::DetectIssues => "detect-issues",
            JobName::PredictIssues => "predict-issues",
            JobName::SendDigest => "send-digest",
            JobName::CleanupData => "cleanup-data",
            JobName::AnalyzeE2eResults => "analyze-e2e-results",
        }
    }

    pub fn is_scheduled(&self) -> bool {
        Self::SCHEDULED.contains(self)
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| CoreError::UnknownJob(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for job in JobName::ALL {
            assert_eq!(job.as_str().parse::<JobName>().unwrap(), job);
        }
        assert!("reindex".parse::<JobName>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&JobName::AnalyzeE2eResults).unwrap();
        assert_eq!(json, "\"analyze-e2e-results\"");
        assert!(!JobName::AnalyzeE2eResults.is_scheduled());
        assert!(JobName::CleanupData.is_scheduled());
    }
}
