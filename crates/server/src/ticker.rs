//! Background minute tick loop.
//!
//! Sleeps until the next whole minute, then asks the dispatcher to run
//! whatever the cadence table says is due at that minute. A tick that
//! overruns the minute delays the next one; skipped minutes are not replayed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use logwarden_rules::cadence::truncate_to_minute;

use crate::state::AppState;

/// The whole minute following `now`.
pub fn next_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(now) + chrono::Duration::minutes(1)
}

/// Time left until `target`, zero once it has passed.
fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Main tick loop. Spawned as a tokio task by `serve`.
pub async fn run_tick_loop(state: Arc<AppState>) {
    info!(
        runner = state.dispatcher.runner_name(),
        offset = %state.cadence.offset(),
        "scheduler tick loop started"
    );

    loop {
        let now = next_minute(Utc::now());
        tokio::time::sleep(until(now, Utc::now())).await;

        if state.cadence.due(now).is_empty() {
            debug!(at = %now.to_rfc3339(), "nothing due");
            continue;
        }
        let summary = state.dispatcher.tick(&state.cadence, now).await;
        let failed = summary.invoked.iter().filter(|r| !r.is_invoked()).count();
        info!(
            jobs = summary.invoked.len(),
            failed,
            "scheduler tick complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn waits_for_the_next_whole_minute() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 12, 4, 45).unwrap();
        let target = Utc.with_ymd_and_hms(2026, 3, 14, 12, 5, 0).unwrap();
        assert_eq!(next_minute(at), target);
        assert_eq!(until(next_minute(at), at), Duration::from_secs(15));

        let on_the_minute = target;
        assert_eq!(next_minute(on_the_minute), target + chrono::Duration::minutes(1));

        let late = at + chrono::Duration::milliseconds(14_500);
        assert_eq!(until(next_minute(late), late), Duration::from_millis(500));
    }

    #[test]
    fn tick_instant_is_the_whole_minute_even_after_a_late_wake() {
        let before = Utc.with_ymd_and_hms(2026, 3, 14, 1, 59, 59).unwrap();
        let target = next_minute(before);
        assert_eq!(target, Utc.with_ymd_and_hms(2026, 3, 14, 2, 0, 0).unwrap());

        let woke = target + chrono::Duration::milliseconds(1_200);
        assert_eq!(until(target, woke), Duration::ZERO);
    }
}
