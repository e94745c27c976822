//! Fans a notification out to every configured channel.
//!
//! Individual channel failures don't block other channels.

use crate::traits::{DeliveryResult, Notification, Notifier};

#[derive(Default)]
pub struct Broadcaster {
    channels: Vec<Box<dyn Notifier>>,
}

impl Broadcaster {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| c.channel_name().to_string())
            .collect()
    }

    /// Deliver to every channel in order and report each outcome.
    pub async fn deliver(&self, notification: &Notification) -> Vec<DeliveryResult> {
        if self.channels.is_empty() {
            tracing::debug!(subject = %notification.subject, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DeliveryResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NotifyError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockNotifier {
        name: String,
        send_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(NotifyError::Config("mock failure".to_string()))
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            &self.name
        }
    }

    fn mock(name: &str, count: &Arc<AtomicUsize>, should_fail: bool) -> Box<dyn Notifier> {
        Box::new(MockNotifier {
            name: name.to_string(),
            send_count: count.clone(),
            should_fail,
        })
    }

    #[tokio::test]
    async fn delivers_to_all_channels() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let broadcaster = Broadcaster::new(vec![
            mock("a", &count_a, false),
            mock("b", &count_b, false),
        ]);

        let results = broadcaster
            .deliver(&Notification::new("digest", "body"))
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.channel_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let failed = Arc::new(AtomicUsize::new(0));
        let count = Arc::new(AtomicUsize::new(0));
        let broadcaster = Broadcaster::new(vec![
            mock("fail", &failed, true),
            mock("ok", &count, false),
        ]);

        let results = broadcaster
            .deliver(&Notification::new("digest", "body"))
            .await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("Configuration error: mock failure"));
        assert!(results[1].success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_channels_returns_empty() {
        let broadcaster = Broadcaster::empty();
        assert!(broadcaster.is_empty());
        let results = broadcaster.deliver(&Notification::new("s", "b")).await;
        assert!(results.is_empty());
    }
}
