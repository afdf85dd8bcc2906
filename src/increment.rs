/// 호가 단위 테이블
/// 현재가 구간별 최소 인상액을 돌려주는 순수 함수.
/// 클라이언트 미리보기와 서버 검증이 같은 테이블을 쓰되, 서버 값이 항상 권위를 가진다.
// region:    --- Imports
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- IncrementTable

/// (구간 시작가, 호가 단위) 오름차순 목록. 금액 단위는 전부 정수 센트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementTable {
    steps: Vec<(i64, i64)>,
}

impl Default for IncrementTable {
    /// 기본 테이블: $0.01~$0.99 → $0.05, ..., $1,000 이상 → $25.00
    fn default() -> Self {
        Self::new(vec![
            (0, 5),
            (100, 25),
            (500, 50),
            (1_000, 100),
            (2_500, 250),
            (10_000, 500),
            (25_000, 1_000),
            (50_000, 2_500),
            (100_000, 2_500),
        ])
    }
}

impl IncrementTable {
    /// 구간 시작가 기준으로 정렬해 보관한다. 첫 구간은 0부터 시작해야 한다.
    pub fn new(mut steps: Vec<(i64, i64)>) -> Self {
        steps.sort_by_key(|(threshold, _)| *threshold);
        if steps.first().map(|(t, _)| *t != 0).unwrap_or(true) {
            steps.insert(0, (0, 1));
        }
        Self { steps }
    }

    /// 현재가에 대한 최소 인상액
    pub fn min_increment(&self, current_price: i64) -> i64 {
        self.steps
            .iter()
            .rev()
            .find(|(threshold, _)| current_price >= *threshold)
            .map(|(_, step)| *step)
            .unwrap_or(1)
    }

    /// 다음 입찰이 만족해야 하는 최소 금액.
    /// 입찰이 아직 없으면 시작가 그대로가 최소 입찰가다.
    pub fn minimum_next_bid(&self, current_price: i64, starting_price: i64, has_bids: bool) -> i64 {
        if has_bids {
            current_price.saturating_add(self.min_increment(current_price))
        } else {
            starting_price
        }
    }
}

// endregion: --- IncrementTable
