/// 위임 입찰 해석기
/// 영국식 경매의 대리 입찰 규칙을 순수 함수로 구현한다.
/// 1. 제출 검증 (최소 입찰가, 본인 금액 인상 여부)
/// 2. 선두/공개 호가 계산 (차순위 가격 규칙)
/// 3. 이벤트 로그 재연산 (철회 승인 시 해당 입찰을 제외하고 처음부터 다시 적용)
///
/// 어느 경로로도 패자의 최대 금액 자체는 밖으로 드러나지 않는다.
/// 공개되는 것은 언제나 "그를 이기는 데 필요한 최소 금액"뿐이다.
// region:    --- Imports
use crate::bidding::model::{BidEvent, BidStatus};
use crate::error::{EngineError, Result};
use crate::increment::IncrementTable;
use std::collections::{HashMap, HashSet};

// endregion: --- Imports

// region:    --- Auction State

/// 선두 입찰 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub bid_id: i64,
    pub bidder_id: i64,
    pub max_amount: i64,
}

/// 이벤트 로그만으로 재구성 가능한 호가 상태
#[derive(Debug, Clone)]
pub struct AuctionState {
    pub starting_price: i64,
    pub reserve_price: Option<i64>,
    pub price: i64,
    pub leader: Option<Standing>,
    pub bid_count: i64,
}

impl AuctionState {
    /// 입찰이 하나도 없는 개시 상태
    pub fn opening(starting_price: i64, reserve_price: Option<i64>) -> Self {
        Self {
            starting_price,
            reserve_price,
            price: starting_price,
            leader: None,
            bid_count: 0,
        }
    }

    /// 다음 입찰이 만족해야 하는 최소 금액
    pub fn minimum_next_bid(&self, table: &IncrementTable) -> i64 {
        table.minimum_next_bid(self.price, self.starting_price, self.leader.is_some())
    }
}

// endregion: --- Auction State

// region:    --- Resolution

/// 제출 한 건이 가져온 변화
#[derive(Debug, Clone)]
pub struct Resolution {
    pub price: i64,
    pub leader: Standing,
    /// 선두가 교체됐을 때의 직전 선두 (outbid 처리/알림 대상)
    pub previous_leader: Option<Standing>,
    /// 들어온 입찰의 결과 상태 (winning 또는 즉시 outbid)
    pub incoming_status: BidStatus,
}

/// 검증을 통과한 제출을 상태에 적용한다. 재연산에서도 같은 경로를 쓴다.
///
/// 공개 호가는 절대 내려가지 않는다 (max 로 클램프). 정상 제출 경로에서는
/// 최소 입찰가 검증이 이를 보장하지만, 재연산 경로에는 검증이 없다.
fn apply_submission(
    state: &mut AuctionState,
    table: &IncrementTable,
    bid_id: i64,
    bidder_id: i64,
    max_amount: i64,
) {
    state.bid_count += 1;
    match state.leader {
        None => {
            // 첫 입찰: 공개 호가는 시작가. 최대 금액이 내정가를 넘으면 내정가까지 끌어올린다.
            let mut price = state.starting_price;
            if let Some(reserve) = state.reserve_price {
                if max_amount >= reserve {
                    price = price.max(reserve.min(max_amount));
                }
            }
            state.price = state.price.max(price);
            state.leader = Some(Standing {
                bid_id,
                bidder_id,
                max_amount,
            });
        }
        Some(leader) if leader.bidder_id == bidder_id => {
            // 본인 최대 금액 인상: 공개 호가는 그대로 두되,
            // 인상으로 내정가에 처음 도달하는 경우에만 내정가까지 올린다.
            let new_max = leader.max_amount.max(max_amount);
            if let Some(reserve) = state.reserve_price {
                if new_max >= reserve && state.price < reserve {
                    state.price = reserve.min(new_max);
                }
            }
            state.leader = Some(Standing {
                bid_id: leader.bid_id,
                bidder_id,
                max_amount: new_max,
            });
        }
        Some(leader) => {
            let h = leader.max_amount;
            if max_amount > h {
                // 선두 교체: 새 호가 = min(m, hMax + inc(hMax)), 내정가 도달 시 내정가까지.
                let mut candidate = h.saturating_add(table.min_increment(h));
                if let Some(reserve) = state.reserve_price {
                    if max_amount >= reserve {
                        candidate = candidate.max(reserve);
                    }
                }
                state.price = state.price.max(candidate.min(max_amount));
                state.leader = Some(Standing {
                    bid_id,
                    bidder_id,
                    max_amount,
                });
            } else {
                // 차순위 가격 규칙: 선두 유지, 새 입찰자는 그를 이기는 데 필요한
                // 최소 금액까지만 호가를 올리고 즉시 outbid 된다.
                // 동률(m == hMax)은 먼저 건 쪽(기존 선두)이 이긴다.
                let candidate = max_amount
                    .saturating_add(table.min_increment(max_amount))
                    .min(h);
                state.price = state.price.max(candidate);
            }
        }
    }
}

/// 새 위임 입찰(또는 금액 인상) 한 건을 해석한다.
///
/// `existing_max` 는 해당 입찰자가 이미 세워 둔 유효 입찰의 최대 금액.
/// 인상만 허용되며, 어떤 입찰도 최소 입찰가 아래로는 받지 않는다.
pub fn resolve(
    state: &AuctionState,
    table: &IncrementTable,
    bid_id: i64,
    bidder_id: i64,
    max_amount: i64,
    existing_max: Option<i64>,
) -> Result<(AuctionState, Resolution)> {
    if let Some(current) = existing_max {
        if max_amount <= current {
            return Err(EngineError::MustIncrease { current });
        }
    }
    let minimum = state.minimum_next_bid(table);
    if max_amount < minimum {
        return Err(EngineError::BidBelowMinimum { minimum });
    }

    let before_leader = state.leader;
    let mut next = state.clone();
    apply_submission(&mut next, table, bid_id, bidder_id, max_amount);

    let leader = next
        .leader
        .expect("제출 적용 후에는 항상 선두가 존재한다");
    let previous_leader = match before_leader {
        Some(prev) if prev.bid_id != leader.bid_id => Some(prev),
        _ => None,
    };
    let incoming_status = if leader.bid_id == bid_id {
        BidStatus::Winning
    } else {
        BidStatus::Outbid
    };

    let price = next.price;
    Ok((
        next,
        Resolution {
            price,
            leader,
            previous_leader,
            incoming_status,
        },
    ))
}

/// 이벤트 로그를 순서대로 다시 적용해 호가 상태를 재구성한다.
///
/// `excluded` 에 든 입찰(철회분)의 이벤트는 건너뛴다. 결과는 그 입찰이
/// 처음부터 없었던 것과 동일하다. 임의 차감으로 가격을 되돌리는 일은 없다.
pub fn replay(
    starting_price: i64,
    reserve_price: Option<i64>,
    events: &[BidEvent],
    bidders: &HashMap<i64, i64>,
    excluded: &HashSet<i64>,
    table: &IncrementTable,
) -> AuctionState {
    let mut state = AuctionState::opening(starting_price, reserve_price);
    let mut ordered: Vec<&BidEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.seq);

    for event in ordered {
        let (bid_id, max_amount) = match (event.trigger_bid_id, event.max_at_event) {
            (Some(bid_id), Some(max)) => (bid_id, max),
            // 보정 이벤트는 파생 결과이므로 재연산 입력이 아니다.
            _ => continue,
        };
        if excluded.contains(&bid_id) {
            continue;
        }
        let Some(&bidder_id) = bidders.get(&bid_id) else {
            continue;
        };
        apply_submission(&mut state, table, bid_id, bidder_id, max_amount);
    }
    state
}

// endregion: --- Resolution
