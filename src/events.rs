use crate::models::market::Market;
use crate::models::position::{Portfolio, Trade};
use crate::oracle::composite::CompositePrice;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Typed events the engine publishes for any observer (a UI, a logger, a
/// future API layer) to subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    PriceUpdate(CompositePrice),
    MarketsUpdate(Vec<Market>),
    NewTrade(Trade),
    PortfolioUpdate(Portfolio),
    BotStatus(BotStatus),
    Log(LogEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Starting,
    Running,
    Halted,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: String,
    pub message: String,
}

/// Broadcast hub for `EngineEvent`s. Subscribers that lag behind the buffer
/// simply miss old events rather than blocking publishers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::BotStatus(BotStatus::Running));
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EngineEvent::BotStatus(BotStatus::Running)));
    }
}
