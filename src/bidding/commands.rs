/// 경매 코디네이터 커맨드 처리
/// 1. 로트 생성 (카탈로그 경계)
/// 2. 위임 입찰
/// 3. 즉시 구매
/// 4. 마감 / 취소
/// 5. 입찰 철회 요청과 심사
///
/// 여기의 모든 변경 함수는 파사드가 잡은 로트 락 안에서만 호출된다.
/// 따라서 같은 로트에 대한 호출은 절대 서로 끼어들지 않는다.
// region:    --- Imports
use crate::auction::events::DomainEvent;
use crate::auction::resolver::{self, AuctionState, Standing};
use crate::bidding::model::{
    amount_in_range, BidStatus, Lot, LotStatus, ProxyBid, RetractionRequest, RetractionStatus,
};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::increment::IncrementTable;
use crate::ledger::{
    BidOutcome, BidWrite, LedgerStore, NewBidEvent, NewLot, NewProxyBid, NewRetraction,
    RetractionOutcome,
};
use crate::notifier::EventBus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

// endregion: --- Imports

// region:    --- Requests

/// 로트 생성 요청 (카탈로그가 넘겨주는 정적 속성)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateLotRequest {
    pub seller_id: i64,
    pub title: String,
    pub starting_price: i64,
    pub reserve_price: Option<i64>,
    pub buy_now_price: Option<i64>,
    pub close_time: DateTime<Utc>,
}

/// 위임 입찰 요청
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidRequest {
    pub bidder_id: i64,
    /// 비공개 최대 금액 (정수 센트)
    pub max_amount: i64,
}

/// 즉시 구매 요청
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BuyNowRequest {
    pub buyer_id: i64,
}

/// 로트 취소 요청 (판매자 본인만)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancelLotRequest {
    pub seller_id: i64,
}

/// 입찰 철회 요청
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetractRequest {
    pub reason_code: String,
    pub explanation: String,
}

/// 철회 심사 결정
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetractionDecision {
    pub approve: bool,
    pub reviewer_note: Option<String>,
}

// endregion: --- Requests

// region:    --- Lot Commands

/// 1. 로트 생성
pub async fn create_lot(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    req: CreateLotRequest,
) -> Result<Lot> {
    if !amount_in_range(req.starting_price)
        || req.reserve_price.map(|p| !amount_in_range(p)).unwrap_or(false)
        || req.buy_now_price.map(|p| !amount_in_range(p)).unwrap_or(false)
    {
        return Err(EngineError::InvalidAmount);
    }
    let now = clock.now();
    let lot = store
        .create_lot(NewLot {
            seller_id: req.seller_id,
            title: req.title,
            starting_price: req.starting_price,
            reserve_price: req.reserve_price,
            buy_now_price: req.buy_now_price,
            close_time: req.close_time,
            created_at: now,
        })
        .await?;
    info!("{:<12} --> 로트 생성: id={}", "Command", lot.id);
    Ok(lot)
}

/// 현재 Winning 상태의 입찰을 Standing 요약으로
fn current_leader(bids: &[ProxyBid]) -> Option<Standing> {
    bids.iter()
        .find(|b| b.status == BidStatus::Winning)
        .map(|b| Standing {
            bid_id: b.id,
            bidder_id: b.bidder_id,
            max_amount: b.max_amount,
        })
}

/// 2. 위임 입찰
/// 새 입찰이거나, 같은 입찰자의 최대 금액 인상이다. 결과(갱신 로트 + 기록된 입찰)를
/// 단일 트랜잭션으로 커밋하고 밀려난 선두에게 BidOutbid 를 발행한다.
pub async fn place_bid(
    store: &dyn LedgerStore,
    bus: &EventBus,
    clock: &dyn Clock,
    table: &IncrementTable,
    lot_id: i64,
    req: PlaceBidRequest,
) -> Result<(Lot, ProxyBid)> {
    info!(
        "{:<12} --> 입찰 처리 시작: lot={}, bidder={}",
        "Command", lot_id, req.bidder_id
    );
    if !amount_in_range(req.max_amount) {
        return Err(EngineError::InvalidAmount);
    }

    let mut lot = store.lot(lot_id).await?;
    let now = clock.now();
    if lot.status != LotStatus::Open || now >= lot.close_time {
        // 마감 이후 도착한 입찰은 조용히 버리지 않고 명시적으로 거절한다.
        return Err(EngineError::AuctionClosed {
            status: lot.status.to_string(),
        });
    }
    if req.bidder_id == lot.seller_id {
        return Err(EngineError::SelfBid);
    }

    let bids = store.bids_for_lot(lot_id).await?;
    let leader = current_leader(&bids);
    let existing = bids
        .iter()
        .find(|b| b.bidder_id == req.bidder_id && b.status.is_standing());

    let state = AuctionState {
        starting_price: lot.starting_price,
        reserve_price: lot.reserve_price,
        price: lot.current_price,
        leader,
        bid_count: lot.bid_count,
    };
    let incoming_bid_id = existing.map(|b| b.id).unwrap_or(0);
    let (next, resolution) = resolver::resolve(
        &state,
        table,
        incoming_bid_id,
        req.bidder_id,
        req.max_amount,
        existing.map(|b| b.max_amount),
    )?;

    lot.current_price = next.price;
    lot.leader_id = Some(resolution.leader.bidder_id);
    lot.bid_count = next.bid_count;

    let bid_write = match existing {
        Some(bid) => BidWrite::Update {
            bid_id: bid.id,
            max_amount: req.max_amount,
            status: resolution.incoming_status,
        },
        None => BidWrite::Insert(NewProxyBid {
            lot_id,
            bidder_id: req.bidder_id,
            max_amount: req.max_amount,
            placed_at: now,
            status: resolution.incoming_status,
        }),
    };

    let outcome = BidOutcome {
        lot: lot.clone(),
        bid: bid_write,
        outbid_bid_ids: resolution
            .previous_leader
            .map(|p| vec![p.bid_id])
            .unwrap_or_default(),
        event: NewBidEvent {
            lot_id,
            price: resolution.price,
            leader_id: Some(resolution.leader.bidder_id),
            max_at_event: Some(req.max_amount),
            recorded_at: now,
        },
    };
    let bid = store.apply_bid_outcome(outcome).await?;

    if let Some(prev) = resolution.previous_leader {
        bus.publish(DomainEvent::BidOutbid {
            lot_id,
            bidder_id: prev.bidder_id,
            current_price: resolution.price,
            timestamp: now,
        });
    }

    info!(
        "{:<12} --> 입찰 수리: lot={}, 공개 호가={}, 선두={}",
        "Command", lot_id, lot.current_price, resolution.leader.bidder_id
    );
    Ok((lot, bid))
}

/// 3. 즉시 구매
/// 공개 호가가 즉시 구매가에 도달하기 전까지만 가능하다.
pub async fn buy_now(
    store: &dyn LedgerStore,
    bus: &EventBus,
    clock: &dyn Clock,
    lot_id: i64,
    req: BuyNowRequest,
) -> Result<Lot> {
    info!(
        "{:<12} --> 즉시 구매 처리 시작: lot={}, buyer={}",
        "Command", lot_id, req.buyer_id
    );
    let mut lot = store.lot(lot_id).await?;
    let now = clock.now();
    if lot.status != LotStatus::Open || now >= lot.close_time {
        return Err(EngineError::AuctionClosed {
            status: lot.status.to_string(),
        });
    }
    if req.buyer_id == lot.seller_id {
        return Err(EngineError::SelfBid);
    }
    let price = match lot.buy_now_price {
        Some(price) if lot.current_price < price => price,
        _ => return Err(EngineError::BuyNowUnavailable),
    };

    let bids = store.bids_for_lot(lot_id).await?;
    let previous_leader = current_leader(&bids);
    let updates: Vec<(i64, BidStatus)> = bids
        .iter()
        .filter(|b| b.status.is_standing())
        .map(|b| (b.id, BidStatus::Outbid))
        .collect();

    lot.status = LotStatus::Sold;
    lot.current_price = price;
    lot.leader_id = Some(req.buyer_id);

    let event = NewBidEvent {
        lot_id,
        price,
        leader_id: Some(req.buyer_id),
        max_at_event: None,
        recorded_at: now,
    };
    store.update_lot(&lot, updates, Some(event)).await?;

    if let Some(prev) = previous_leader {
        bus.publish(DomainEvent::BidOutbid {
            lot_id,
            bidder_id: prev.bidder_id,
            current_price: price,
            timestamp: now,
        });
    }
    bus.publish(DomainEvent::AuctionWon {
        lot_id,
        winner_id: req.buyer_id,
        price,
        timestamp: now,
    });
    info!(
        "{:<12} --> 즉시 구매 완료: lot={}, 최종가={}",
        "Command", lot_id, price
    );
    Ok(lot)
}

/// 4-1. 마감
/// 멱등: 이미 종결된 로트는 그 결과를 그대로 돌려주고,
/// 마감 시각 전에 도착한 호출(이른 스케줄러)은 아무것도 바꾸지 않는다.
pub async fn close_lot(
    store: &dyn LedgerStore,
    bus: &EventBus,
    clock: &dyn Clock,
    lot_id: i64,
) -> Result<Lot> {
    let mut lot = store.lot(lot_id).await?;
    if lot.status != LotStatus::Open {
        return Ok(lot);
    }
    let now = clock.now();
    if now < lot.close_time {
        return Ok(lot);
    }

    lot.status = match lot.leader_id {
        None => LotStatus::Closed,
        Some(_) => {
            let reserve_met = lot
                .reserve_price
                .map(|reserve| lot.current_price >= reserve)
                .unwrap_or(true);
            if reserve_met {
                LotStatus::Sold
            } else {
                LotStatus::ReserveNotMet
            }
        }
    };
    store.update_lot(&lot, Vec::new(), None).await?;

    if lot.status == LotStatus::Sold {
        if let Some(winner_id) = lot.leader_id {
            bus.publish(DomainEvent::AuctionWon {
                lot_id,
                winner_id,
                price: lot.current_price,
                timestamp: now,
            });
        }
    }
    info!(
        "{:<12} --> 로트 마감: id={}, 결과={}",
        "Command", lot_id, lot.status
    );
    Ok(lot)
}

/// 4-2. 취소 (판매자 본인, 마감 전)
pub async fn cancel_lot(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    lot_id: i64,
    req: CancelLotRequest,
) -> Result<Lot> {
    let mut lot = store.lot(lot_id).await?;
    if lot.status != LotStatus::Open || clock.now() >= lot.close_time {
        return Err(EngineError::AuctionClosed {
            status: lot.status.to_string(),
        });
    }
    if req.seller_id != lot.seller_id {
        return Err(EngineError::Forbidden);
    }

    let bids = store.bids_for_lot(lot_id).await?;
    let updates: Vec<(i64, BidStatus)> = bids
        .iter()
        .filter(|b| b.status.is_standing())
        .map(|b| (b.id, BidStatus::Void))
        .collect();

    lot.status = LotStatus::Cancelled;
    lot.leader_id = None;
    store.update_lot(&lot, updates, None).await?;
    info!("{:<12} --> 로트 취소: id={}", "Command", lot_id);
    Ok(lot)
}

// endregion: --- Lot Commands

// region:    --- Retraction Commands

/// 5-1. 철회 요청 생성
/// 심사 전까지는 로트 상태를 일절 건드리지 않는다.
pub async fn request_retraction(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    bid_id: i64,
    req: RetractRequest,
) -> Result<RetractionRequest> {
    let bid = store.bid(bid_id).await?;
    if !bid.status.is_standing() {
        return Err(EngineError::InvalidTransition {
            from: bid.status.to_string(),
            action: "철회 요청".to_string(),
        });
    }
    let lot = store.lot(bid.lot_id).await?;
    let now = clock.now();
    if lot.status != LotStatus::Open || now >= lot.close_time {
        return Err(EngineError::AuctionClosed {
            status: lot.status.to_string(),
        });
    }

    let request = store
        .create_retraction(NewRetraction {
            bid_id,
            lot_id: bid.lot_id,
            reason_code: req.reason_code,
            explanation: req.explanation,
            requested_at: now,
        })
        .await?;
    info!(
        "{:<12} --> 철회 요청 접수: request={}, bid={}",
        "Command", request.id, bid_id
    );
    Ok(request)
}

/// 5-2. 철회 심사
/// 승인 시 해당 입찰을 제외하고 이벤트 로그를 재연산해 호가/선두를 다시 구한다.
/// 임의 차감은 절대 하지 않는다.
pub async fn decide_retraction(
    store: &dyn LedgerStore,
    bus: &EventBus,
    clock: &dyn Clock,
    table: &IncrementTable,
    request_id: i64,
    decision: RetractionDecision,
) -> Result<RetractionRequest> {
    let mut request = store.retraction(request_id).await?;
    if request.status != RetractionStatus::Pending {
        return Err(EngineError::AlreadyDecided {
            status: request.status.to_string(),
        });
    }
    let now = clock.now();
    request.reviewer_note = decision.reviewer_note;

    if !decision.approve {
        request.status = RetractionStatus::Denied;
        store
            .apply_retraction_outcome(RetractionOutcome {
                request: request.clone(),
                lot: None,
                bid_status_updates: Vec::new(),
                event: None,
            })
            .await?;
        bus.publish(DomainEvent::RetractionDecided {
            request_id,
            bid_id: request.bid_id,
            approved: false,
            timestamp: now,
        });
        info!("{:<12} --> 철회 거부: request={}", "Command", request_id);
        return Ok(request);
    }

    let mut lot = store.lot(request.lot_id).await?;
    if lot.status != LotStatus::Open {
        return Err(EngineError::AuctionClosed {
            status: lot.status.to_string(),
        });
    }

    let bids = store.bids_for_lot(request.lot_id).await?;
    let events = store.bid_events(request.lot_id).await?;
    let bidders: HashMap<i64, i64> = bids.iter().map(|b| (b.id, b.bidder_id)).collect();
    let mut excluded: HashSet<i64> = bids
        .iter()
        .filter(|b| b.status == BidStatus::Retracted)
        .map(|b| b.id)
        .collect();
    excluded.insert(request.bid_id);

    let derived = resolver::replay(
        lot.starting_price,
        lot.reserve_price,
        &events,
        &bidders,
        &excluded,
        table,
    );

    lot.current_price = derived.price;
    lot.leader_id = derived.leader.map(|l| l.bidder_id);
    lot.bid_count = derived.bid_count;

    let mut updates: Vec<(i64, BidStatus)> = vec![(request.bid_id, BidStatus::Retracted)];
    for bid in bids.iter().filter(|b| b.status.is_standing() && b.id != request.bid_id) {
        let status = match derived.leader {
            Some(leader) if leader.bid_id == bid.id => BidStatus::Winning,
            _ => BidStatus::Outbid,
        };
        updates.push((bid.id, status));
    }

    request.status = RetractionStatus::Approved;
    store
        .apply_retraction_outcome(RetractionOutcome {
            request: request.clone(),
            lot: Some(lot.clone()),
            bid_status_updates: updates,
            event: Some(NewBidEvent {
                lot_id: lot.id,
                price: derived.price,
                leader_id: lot.leader_id,
                max_at_event: None,
                recorded_at: now,
            }),
        })
        .await?;

    bus.publish(DomainEvent::RetractionDecided {
        request_id,
        bid_id: request.bid_id,
        approved: true,
        timestamp: now,
    });
    info!(
        "{:<12} --> 철회 승인: request={}, 재연산 호가={}",
        "Command", request_id, derived.price
    );
    Ok(request)
}

// endregion: --- Retraction Commands
