use tokio::sync::broadcast;

use super::TaskEvent;

/// Fan-out channel for task events.
///
/// Each subscriber sees the events of one task in emission order. A
/// subscriber that falls more than `capacity` events behind receives
/// `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: TaskEvent) {
        // No receivers is fine.
        if self.sender.send(event).is_err() {
            tracing::trace!("Task event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AnalysisType, TaskStatus};
    use chrono::Utc;

    fn event(progress: u8) -> TaskEvent {
        TaskEvent {
            task_id: "t-1".to_string(),
            analysis_type: AnalysisType::Annotation,
            status: TaskStatus::Running,
            progress,
            result: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_in_order() {
        let notifier = EventNotifier::new(16);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.publish(event(10));
        notifier.publish(event(50));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().progress, 10);
            assert_eq!(rx.recv().await.unwrap().progress, 50);
        }
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let notifier = EventNotifier::new(4);
        notifier.publish(event(10));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let notifier = EventNotifier::new(4);
        notifier.publish(event(10));
        let mut rx = notifier.subscribe();
        notifier.publish(event(20));
        assert_eq!(rx.recv().await.unwrap().progress, 20);
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let notifier = EventNotifier::new(2);
        let mut rx = notifier.subscribe();
        for progress in [10, 20, 30, 40] {
            notifier.publish(event(progress));
        }

        let lagged = tokio_test::assert_err!(rx.try_recv());
        assert!(matches!(
            lagged,
            tokio::sync::broadcast::error::TryRecvError::Lagged(2)
        ));
        assert_eq!(tokio_test::assert_ok!(rx.try_recv()).progress, 30);
        assert_eq!(tokio_test::assert_ok!(rx.try_recv()).progress, 40);
    }
}
