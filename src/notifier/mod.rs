/// 도메인 이벤트 버스
/// 알림 마이크로서비스는 별도로 있다 가정하고, 엔진은 발행만 책임진다.
/// 구독자가 없거나 밀려서 이벤트를 놓치는 것은 알림 계층의 재조회로 해결할 문제다.
// region:    --- Imports
use crate::auction::events::DomainEvent;
use tokio::sync::broadcast;
use tracing::debug;

// endregion: --- Imports

// region:    --- EventBus

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 이벤트 발행. 구독자 부재는 오류가 아니다.
    pub fn publish(&self, event: DomainEvent) {
        debug!("{:<12} --> 도메인 이벤트 발행: {:?}", "EventBus", event);
        let _ = self.tx.send(event);
    }

    /// 알림 계층이 구독할 수신 채널
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// endregion: --- EventBus
