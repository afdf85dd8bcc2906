/// 엔진 스케줄러
/// 외부 크론/타이머가 있다 가정하면 없어도 되는 구성요소지만, 단독 실행을 위해
/// 주기적으로 다음을 수행한다.
/// 1. 마감 시각이 지난 로트 마감
/// 2. 만료된 제안 expired 전이 (게으른 집행의 보조)
/// 3. 만료된 held 예약 해제
/// 호출이 늦거나, 중복되거나, 실시간 입찰과 경합해도 키 락 덕분에 안전하다.
// region:    --- Imports
use crate::facade::TransactionFacade;
use tokio::time::{interval, Duration};
use tracing::debug;

// endregion: --- Imports

// region:    --- EngineScheduler

pub struct EngineScheduler {
    facade: TransactionFacade,
    period: Duration,
}

impl EngineScheduler {
    pub fn new(facade: TransactionFacade) -> Self {
        Self {
            facade,
            period: Duration::from_secs(1),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// 주기 작업 시작
    pub fn start(self) {
        tokio::spawn(async move {
            let mut interval = interval(self.period);
            loop {
                interval.tick().await;
                let closed = self.facade.close_due_lots().await;
                let offers = self.facade.sweep_offers().await;
                let reservations = self.facade.sweep_reservations().await;
                if closed + offers + reservations > 0 {
                    debug!(
                        "{:<12} --> 주기 작업: 마감 {}건, 제안 만료 {}건, 예약 해제 {}건",
                        "Scheduler", closed, offers, reservations
                    );
                }
            }
        });
    }
}

// endregion: --- EngineScheduler
