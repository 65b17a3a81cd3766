//! Event bus for surfacing recovery progress to an operator
//!
//! Publisher-subscriber pattern over a bounded channel. The transport that
//! carries these events further (UI, IPC) lives outside this crate.

use std::fmt;
use tokio::sync::mpsc;

use crate::types::RecoveryActionType;

/// Channel capacity; events beyond this are dropped rather than blocking
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Recovery lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    StrategyStarted {
        strategy_id: String,
        steps: usize,
    },
    StepStarted {
        strategy_id: String,
        index: usize,
        action: RecoveryActionType,
    },
    StepCompleted {
        strategy_id: String,
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        strategy_id: String,
        index: usize,
        optional: bool,
        reason: String,
    },
    StrategySwitched {
        from: String,
        to: String,
        reason: SwitchReason,
    },
    RecoveryCancelled {
        strategy_id: String,
        completed_steps: usize,
    },
    RecoveryFinished {
        strategy_id: String,
        success: bool,
        duration_ms: u64,
    },
}

/// Why the orchestrator abandoned a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    RequiredStepFailed,
    SlowProgress,
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchReason::RequiredStepFailed => write!(f, "required step failed"),
            SwitchReason::SlowProgress => write!(f, "progress too slow"),
        }
    }
}

/// Event bus for publishing recovery events
pub struct EventBus {
    sender: mpsc::Sender<RecoveryEvent>,
}

impl EventBus {
    /// Create new event bus with a bounded channel
    pub fn new() -> (Self, mpsc::Receiver<RecoveryEvent>) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (EventBus { sender }, receiver)
    }

    /// Emit an event without waiting; dropped when the channel is full or closed
    pub fn emit(&self, event: RecoveryEvent) {
        let _ = self.sender.try_send(event);
    }

    /// Clone sender for multi-producer usage
    pub fn clone_sender(&self) -> mpsc::Sender<RecoveryEvent> {
        self.sender.clone()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        EventBus {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_emission() {
        let (bus, mut receiver) = EventBus::new();

        bus.emit(RecoveryEvent::StrategyStarted {
            strategy_id: "wait_and_retry".to_string(),
            steps: 2,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");

        assert_eq!(
            event,
            RecoveryEvent::StrategyStarted {
                strategy_id: "wait_and_retry".to_string(),
                steps: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_event_bus_clone() {
        let (bus1, mut receiver) = EventBus::new();
        let bus2 = bus1.clone();

        bus1.emit(RecoveryEvent::RecoveryCancelled {
            strategy_id: "a".into(),
            completed_steps: 0,
        });
        bus2.emit(RecoveryEvent::RecoveryFinished {
            strategy_id: "b".into(),
            success: true,
            duration_ms: 4,
        });

        assert!(matches!(receiver.recv().await, Some(RecoveryEvent::RecoveryCancelled { .. })));
        assert!(matches!(receiver.recv().await, Some(RecoveryEvent::RecoveryFinished { .. })));
    }

    #[tokio::test]
    async fn test_bounded_channel_behavior() {
        let (bus, mut receiver) = EventBus::new();

        for i in 0..150 {
            bus.emit(RecoveryEvent::StepCompleted {
                strategy_id: "s".into(),
                index: i,
                duration_ms: 0,
            });
        }

        let mut received = 0;
        while let Ok(Some(_)) = timeout(Duration::from_millis(20), receiver.recv()).await {
            received += 1;
        }
        assert_eq!(received, EVENT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let (bus, receiver) = EventBus::new();
        drop(receiver);
        bus.emit(RecoveryEvent::RecoveryCancelled {
            strategy_id: "s".into(),
            completed_steps: 1,
        });
    }

    #[test]
    fn test_switch_reason_display() {
        assert_eq!(SwitchReason::SlowProgress.to_string(), "progress too slow");
        assert_eq!(SwitchReason::RequiredStepFailed.to_string(), "required step failed");
    }
}
