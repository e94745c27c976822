use cron::Schedule;
use serde::Serialize;

use logwarden_core::JobName;

/// One cadence rule.
#[derive(Debug, Clone, Serialize)]
pub struct CadenceEntry {
    pub job: JobName,
    /// The 5-field expression as written.
    pub cron: String,
    #[serde(skip)]
    pub(crate) schedule: Schedule,
}
