/// 시계 추상화
/// 마감/만료 판정에 쓰이는 "현재 시각"을 한 곳에서 주입받는다.
/// 테스트에서는 ManualClock 으로 시간을 결정적으로 제어한다.
// region:    --- Imports
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

// endregion: --- Imports

// region:    --- Clock

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 실제 벽시계
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 테스트용 수동 시계
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 시각 지정
    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.lock().unwrap() = t;
    }

    /// 시각 전진
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// endregion: --- Clock
