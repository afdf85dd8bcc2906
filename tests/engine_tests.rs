use bidding_engine::auction::events::DomainEvent;
use bidding_engine::bidding::commands::{
    BuyNowRequest, CancelLotRequest, CreateLotRequest, PlaceBidRequest, RetractRequest,
    RetractionDecision,
};
use async_trait::async_trait;
use bidding_engine::bidding::model::{
    BidEvent, BidStatus, Listing, Lot, LotStatus, Offer, OfferStatus, ProxyBid, ReservationStatus,
    RetractionRequest, RetractionStatus, StockReservation, MAX_AMOUNT_CENTS,
};
use bidding_engine::clock::ManualClock;
use bidding_engine::error::EngineError;
use bidding_engine::facade::TransactionFacade;
use bidding_engine::increment::IncrementTable;
use bidding_engine::inventory::{CreateListingRequest, ReserveRequest};
use bidding_engine::ledger::{
    BidOutcome, LedgerStore, MemoryLedger, NewBidEvent, NewListing, NewLot, NewOffer,
    NewReservation, NewRetraction, RetractionOutcome,
};
use bidding_engine::notifier::EventBus;
use bidding_engine::offers::{CounterOfferRequest, MakeOfferRequest, OfferActionRequest};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// 인메모리 원장 + 수동 시계로 엔진을 구성한다
fn engine(table: IncrementTable) -> (TransactionFacade, Arc<MemoryLedger>, Arc<ManualClock>) {
    let store = Arc::new(MemoryLedger::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let facade = TransactionFacade::new(
        store.clone(),
        EventBus::default(),
        clock.clone(),
        table,
    );
    (facade, store, clock)
}

fn lot_request(seller_id: i64, starting_price: i64) -> CreateLotRequest {
    CreateLotRequest {
        seller_id,
        title: "테스트 로트".to_string(),
        starting_price,
        reserve_price: None,
        buy_now_price: None,
        close_time: t0() + Duration::hours(1),
    }
}

fn bid(bidder_id: i64, max_amount: i64) -> PlaceBidRequest {
    PlaceBidRequest {
        bidder_id,
        max_amount,
    }
}

// region:    --- Proxy Bidding

/// 위임 입찰 종단 시나리오: A(최대 2000) 대 B(최대 1500).
/// 공개 호가는 B를 이기는 데 필요한 최소 금액(1550)에서 멈추고 A가 낙찰된다.
#[tokio::test]
async fn proxy_bidding_second_price_end_to_end() {
    let table = IncrementTable::new(vec![(0, 50), (2_500, 100)]);
    let (facade, _store, clock) = engine(table);
    let lot = facade.create_lot(lot_request(1, 1_000)).await.unwrap();

    let (lot_after_a, bid_a) = facade.place_bid(lot.id, bid(11, 2_000)).await.unwrap();
    assert_eq!(lot_after_a.current_price, 1_000);
    assert_eq!(bid_a.status, BidStatus::Winning);

    let (lot_after_b, bid_b) = facade.place_bid(lot.id, bid(22, 1_500)).await.unwrap();
    assert_eq!(lot_after_b.current_price, 1_550);
    assert_eq!(lot_after_b.leader_id, Some(11));
    assert_eq!(bid_b.status, BidStatus::Outbid);

    let view = facade.lot_view(lot.id).await.unwrap();
    assert_eq!(view.leader.as_deref(), Some("***11"));
    assert_eq!(view.minimum_next_bid, 1_600);

    clock.advance(Duration::hours(2));
    let closed = facade.close_lot(lot.id).await.unwrap();
    assert_eq!(closed.status, LotStatus::Sold);
    assert_eq!(closed.leader_id, Some(11));
    assert_eq!(closed.current_price, 1_550);
}

/// 공개 호가는 open 상태에서 단조 비감소
#[tokio::test]
async fn public_price_is_monotonic() {
    let (facade, _store, _clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let lot = facade.create_lot(lot_request(1, 1_000)).await.unwrap();

    let mut last = 0;
    for (bidder, max) in [(11, 10_000), (22, 4_000), (33, 6_000), (44, 20_000)] {
        let (lot, _) = facade.place_bid(lot.id, bid(bidder, max)).await.unwrap();
        assert!(lot.current_price >= last, "호가가 내려갔다");
        last = lot.current_price;
    }
}

/// 상한을 넘는 금액은 어디서든 입력 검증 단계에서 거절된다.
/// i64 상한 근처의 값이 엔진 내부 산술에 닿는 일 자체가 없어야 한다.
#[tokio::test]
async fn oversized_amounts_are_rejected() {
    let (facade, _store, _clock) = engine(IncrementTable::default());

    let err = facade
        .create_lot(lot_request(1, i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount));

    let lot = facade.create_lot(lot_request(1, 1_000)).await.unwrap();
    let err = facade
        .place_bid(lot.id, bid(11, MAX_AMOUNT_CENTS + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount));
    assert_eq!(err.code(), "INVALID_AMOUNT");

    // 상한 자체는 유효한 입찰이다
    facade
        .place_bid(lot.id, bid(11, MAX_AMOUNT_CENTS))
        .await
        .unwrap();

    let listing = facade.create_listing(listing_request(1)).await.unwrap();
    let err = facade
        .make_offer(offer_request(listing.id, 2, i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount));

    let offer = facade
        .make_offer(offer_request(listing.id, 2, 8_000))
        .await
        .unwrap();
    let err = facade
        .counter_offer(
            offer.id,
            CounterOfferRequest {
                seller_id: 1,
                counter_amount: i64::MAX,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount));
}

/// 검증 거절: 최소 입찰가 미달 / 인상 아님 / 본인 경매 입찰 / 마감 후 입찰
#[tokio::test]
async fn bid_validation_rejections() {
    let (facade, _store, clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let lot = facade.create_lot(lot_request(1, 5_000)).await.unwrap();

    let err = facade.place_bid(lot.id, bid(11, 4_000)).await.unwrap_err();
    assert!(matches!(err, EngineError::BidBelowMinimum { minimum: 5_000 }));
    assert_eq!(err.code(), "LOW_BID");

    facade.place_bid(lot.id, bid(11, 10_000)).await.unwrap();
    let err = facade.place_bid(lot.id, bid(11, 8_000)).await.unwrap_err();
    assert!(matches!(err, EngineError::MustIncrease { current: 10_000 }));

    let err = facade.place_bid(lot.id, bid(1, 20_000)).await.unwrap_err();
    assert!(matches!(err, EngineError::SelfBid));

    clock.advance(Duration::hours(2));
    let err = facade.place_bid(lot.id, bid(22, 20_000)).await.unwrap_err();
    assert!(matches!(err, EngineError::AuctionClosed { .. }));
    assert_eq!(err.code(), "ALREADY_ENDED");
}

/// 비공개 최대 금액과 내정가는 어떤 공개 프로젝션에도 실리지 않는다
#[tokio::test]
async fn proxy_max_never_leaks() {
    let (facade, _store, _clock) = engine(IncrementTable::default());
    // 내정가는 어떤 입찰도 닿지 못하는 값으로 둔다 (도달하면 호가 자체가 내정가가 된다)
    let lot = facade
        .create_lot(CreateLotRequest {
            reserve_price: Some(99_999_999),
            ..lot_request(1, 1_000)
        })
        .await
        .unwrap();
    facade.place_bid(lot.id, bid(11, 987_654)).await.unwrap();
    facade.place_bid(lot.id, bid(22, 3_000)).await.unwrap();

    let view = serde_json::to_string(&facade.lot_view(lot.id).await.unwrap()).unwrap();
    assert!(!view.contains("987654"), "최대 금액 노출: {view}");
    assert!(!view.contains("99999999"), "내정가 노출: {view}");
    assert!(view.contains("***11"), "선두는 마스킹된 형태로만: {view}");

    let events = serde_json::to_string(&facade.lot_events(lot.id).await.unwrap()).unwrap();
    assert!(!events.contains("987654"), "이벤트에 최대 금액 노출: {events}");
}

/// 동시 입찰: 어떤 순서로 도착하든 최종 호가와 선두는 동일하다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bids_are_serialized() {
    let (facade, _store, _clock) = engine(IncrementTable::default());
    let lot = facade.create_lot(lot_request(1, 1_000)).await.unwrap();

    let f1 = facade.clone();
    let f2 = facade.clone();
    let lot_id = lot.id;
    let (a, b) = tokio::join!(
        tokio::spawn(async move { f1.place_bid(lot_id, bid(11, 10_000)).await }),
        tokio::spawn(async move { f2.place_bid(lot_id, bid(22, 9_000)).await }),
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    // min(10000, 9000 + inc(9000)=250) = 9250, 선두는 더 높은 최대 금액 쪽
    let view = facade.lot_view(lot_id).await.unwrap();
    assert_eq!(view.current_price, 9_250);
    assert_eq!(view.leader.as_deref(), Some("***11"));
    assert_eq!(view.bid_count, 2);
}

// endregion: --- Proxy Bidding

// region:    --- Buy Now / Close / Cancel

#[tokio::test]
async fn buy_now_ends_auction_at_fixed_price() {
    let (facade, store, _clock) = engine(IncrementTable::default());
    let lot = facade
        .create_lot(CreateLotRequest {
            buy_now_price: Some(5_000),
            ..lot_request(1, 1_000)
        })
        .await
        .unwrap();
    let (_, standing) = facade.place_bid(lot.id, bid(11, 2_000)).await.unwrap();

    let sold = facade.buy_now(lot.id, BuyNowRequest { buyer_id: 33 }).await.unwrap();
    assert_eq!(sold.status, LotStatus::Sold);
    assert_eq!(sold.current_price, 5_000);
    assert_eq!(sold.leader_id, Some(33));

    // 서 있던 입찰은 전부 outbid 처리
    assert_eq!(store.bid(standing.id).await.unwrap().status, BidStatus::Outbid);

    let err = facade.place_bid(lot.id, bid(44, 9_000)).await.unwrap_err();
    assert!(matches!(err, EngineError::AuctionClosed { .. }));
}

/// 공개 호가가 즉시 구매가에 도달한 뒤에는 즉시 구매 불가
#[tokio::test]
async fn buy_now_unavailable_once_price_reaches_it() {
    let (facade, _store, _clock) = engine(IncrementTable::default());
    let lot = facade
        .create_lot(CreateLotRequest {
            buy_now_price: Some(2_000),
            ..lot_request(1, 1_000)
        })
        .await
        .unwrap();
    facade.place_bid(lot.id, bid(11, 10_000)).await.unwrap();
    facade.place_bid(lot.id, bid(22, 3_000)).await.unwrap();

    let err = facade
        .buy_now(lot.id, BuyNowRequest { buyer_id: 33 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BuyNowUnavailable));
}

/// 마감 판정: 입찰 없음 → closed, 내정가 미달 → reserve-not-met, 그 외 → sold.
/// 마감은 멱등이고 이른 호출은 아무것도 바꾸지 않는다.
#[tokio::test]
async fn close_lot_outcomes() {
    let (facade, _store, clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let empty = facade.create_lot(lot_request(1, 1_000)).await.unwrap();
    let unmet = facade
        .create_lot(CreateLotRequest {
            reserve_price: Some(5_000),
            ..lot_request(1, 1_000)
        })
        .await
        .unwrap();
    facade.place_bid(unmet.id, bid(11, 3_000)).await.unwrap();

    // 마감 시각 전의 호출은 no-op
    let early = facade.close_lot(empty.id).await.unwrap();
    assert_eq!(early.status, LotStatus::Open);

    clock.advance(Duration::hours(2));
    assert_eq!(facade.close_lot(empty.id).await.unwrap().status, LotStatus::Closed);
    assert_eq!(
        facade.close_lot(unmet.id).await.unwrap().status,
        LotStatus::ReserveNotMet
    );

    // 멱등: 재호출은 같은 결과를 돌려준다
    assert_eq!(facade.close_lot(empty.id).await.unwrap().status, LotStatus::Closed);
}

#[tokio::test]
async fn cancel_lot_voids_standing_bids() {
    let (facade, store, _clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let lot = facade.create_lot(lot_request(1, 1_000)).await.unwrap();
    let (_, standing) = facade.place_bid(lot.id, bid(11, 5_000)).await.unwrap();

    let err = facade
        .cancel_lot(lot.id, CancelLotRequest { seller_id: 99 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    let cancelled = facade
        .cancel_lot(lot.id, CancelLotRequest { seller_id: 1 })
        .await
        .unwrap();
    assert_eq!(cancelled.status, LotStatus::Cancelled);
    assert_eq!(cancelled.leader_id, None);
    assert_eq!(store.bid(standing.id).await.unwrap().status, BidStatus::Void);
}

/// 스케줄러 훅: 마감 시각이 지난 open 로트만 마감된다
#[tokio::test]
async fn close_due_lots_sweeps_expired_only() {
    let (facade, _store, clock) = engine(IncrementTable::default());
    let due_a = facade.create_lot(lot_request(1, 1_000)).await.unwrap();
    let due_b = facade.create_lot(lot_request(1, 1_000)).await.unwrap();
    let later = facade
        .create_lot(CreateLotRequest {
            close_time: t0() + Duration::hours(3),
            ..lot_request(1, 1_000)
        })
        .await
        .unwrap();

    clock.advance(Duration::hours(2));
    assert_eq!(facade.close_due_lots().await, 2);
    assert_eq!(facade.lot_view(due_a.id).await.unwrap().status, LotStatus::Closed);
    assert_eq!(facade.lot_view(due_b.id).await.unwrap().status, LotStatus::Closed);
    assert_eq!(facade.lot_view(later.id).await.unwrap().status, LotStatus::Open);
    // 재호출은 대상이 없다
    assert_eq!(facade.close_due_lots().await, 0);
}

// endregion: --- Buy Now / Close / Cancel

// region:    --- Retraction

/// 철회 승인은 이벤트 재연산으로 처리된다. 결과는 그 입찰이
/// 처음부터 없었던 것과 동일해야 한다.
#[tokio::test]
async fn approved_retraction_replays_history() {
    let (facade, store, _clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let lot = facade.create_lot(lot_request(1, 5_000)).await.unwrap();

    let (_, bid_a) = facade.place_bid(lot.id, bid(11, 10_000)).await.unwrap();
    let (_, bid_b) = facade.place_bid(lot.id, bid(22, 6_000)).await.unwrap();
    let (after_c, bid_c) = facade.place_bid(lot.id, bid(44, 20_000)).await.unwrap();
    assert_eq!(after_c.current_price, 10_500);

    let request = facade
        .request_retraction(
            bid_a.id,
            RetractRequest {
                reason_code: "typo".to_string(),
                explanation: "금액 입력 실수".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(request.status, RetractionStatus::Pending);

    let decided = facade
        .decide_retraction(
            request.id,
            RetractionDecision {
                approve: true,
                reviewer_note: Some("정황 확인됨".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(decided.status, RetractionStatus::Approved);

    // bid_a 없이 재연산: bid_b 가 개시(5000), bid_c 가 교체(6500)
    let view = facade.lot_view(lot.id).await.unwrap();
    assert_eq!(view.current_price, 6_500);
    assert_eq!(view.leader.as_deref(), Some("***44"));
    assert_eq!(view.bid_count, 2);

    assert_eq!(store.bid(bid_a.id).await.unwrap().status, BidStatus::Retracted);
    assert_eq!(store.bid(bid_b.id).await.unwrap().status, BidStatus::Outbid);
    assert_eq!(store.bid(bid_c.id).await.unwrap().status, BidStatus::Winning);

    // 같은 요청의 재심사는 거절
    let err = facade
        .decide_retraction(
            request.id,
            RetractionDecision {
                approve: false,
                reviewer_note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyDecided { .. }));

    // 철회된 입찰로는 새 철회 요청을 만들 수 없다
    let err = facade
        .request_retraction(
            bid_a.id,
            RetractRequest {
                reason_code: "typo".to_string(),
                explanation: "재요청".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

/// 거부된 철회는 로트 상태를 일절 건드리지 않는다
#[tokio::test]
async fn denied_retraction_changes_nothing() {
    let (facade, store, _clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let lot = facade.create_lot(lot_request(1, 5_000)).await.unwrap();
    let (_, bid_a) = facade.place_bid(lot.id, bid(11, 10_000)).await.unwrap();
    facade.place_bid(lot.id, bid(22, 6_000)).await.unwrap();
    let before = facade.lot_view(lot.id).await.unwrap();

    let request = facade
        .request_retraction(
            bid_a.id,
            RetractRequest {
                reason_code: "regret".to_string(),
                explanation: "마음이 바뀌었습니다".to_string(),
            },
        )
        .await
        .unwrap();
    let decided = facade
        .decide_retraction(
            request.id,
            RetractionDecision {
                approve: false,
                reviewer_note: Some("사유 불충분".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(decided.status, RetractionStatus::Denied);

    let after = facade.lot_view(lot.id).await.unwrap();
    assert_eq!(after.current_price, before.current_price);
    assert_eq!(after.leader, before.leader);
    assert_eq!(after.bid_count, before.bid_count);
    assert_eq!(store.bid(bid_a.id).await.unwrap().status, BidStatus::Winning);
}

// endregion: --- Retraction

// region:    --- Offers

fn listing_request(seller_id: i64) -> CreateListingRequest {
    CreateListingRequest {
        seller_id,
        title: "테스트 리스팅".to_string(),
        price: 10_000,
        available_quantity: 5,
    }
}

fn offer_request(listing_id: i64, buyer_id: i64, amount: i64) -> MakeOfferRequest {
    MakeOfferRequest {
        listing_id,
        buyer_id,
        amount,
        message: None,
        ttl_secs: None,
    }
}

#[tokio::test]
async fn offer_accept_and_single_redeem() {
    let (facade, _store, _clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();

    // 판매자 본인 제안은 거절
    let err = facade
        .make_offer(offer_request(listing.id, 1, 8_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SelfBid));

    let offer = facade
        .make_offer(offer_request(listing.id, 2, 8_000))
        .await
        .unwrap();
    assert_eq!(offer.status, OfferStatus::Pending);

    // pending 수락은 판매자만
    let err = facade
        .accept_offer(offer.id, OfferActionRequest { actor_id: 2 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    let accepted = facade
        .accept_offer(offer.id, OfferActionRequest { actor_id: 1 })
        .await
        .unwrap();
    assert_eq!(accepted.status, OfferStatus::Accepted);

    let (_, amount) = facade
        .redeem_offer_override(offer.id, OfferActionRequest { actor_id: 2 })
        .await
        .unwrap();
    assert_eq!(amount, 8_000);

    // 오버라이드는 정확히 한 번
    let err = facade
        .redeem_offer_override(offer.id, OfferActionRequest { actor_id: 2 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OverrideAlreadyUsed));
}

/// 역제안 이후에는 구매자 쪽만 수락/철회할 수 있고, 최종가는 역제안가다
#[tokio::test]
async fn countered_offer_flow() {
    let (facade, _store, _clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();
    let offer = facade
        .make_offer(offer_request(listing.id, 2, 8_000))
        .await
        .unwrap();

    let err = facade
        .counter_offer(
            offer.id,
            CounterOfferRequest {
                seller_id: 99,
                counter_amount: 9_000,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    let countered = facade
        .counter_offer(
            offer.id,
            CounterOfferRequest {
                seller_id: 1,
                counter_amount: 9_000,
            },
        )
        .await
        .unwrap();
    assert_eq!(countered.status, OfferStatus::Countered);
    assert_eq!(countered.counter_amount, Some(9_000));

    // 역제안은 1회 한정 (구매자 재역제안 없음)
    let err = facade
        .counter_offer(
            offer.id,
            CounterOfferRequest {
                seller_id: 1,
                counter_amount: 8_500,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    // countered 수락은 구매자만
    let err = facade
        .accept_offer(offer.id, OfferActionRequest { actor_id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    facade
        .accept_offer(offer.id, OfferActionRequest { actor_id: 2 })
        .await
        .unwrap();
    let (_, amount) = facade
        .redeem_offer_override(offer.id, OfferActionRequest { actor_id: 2 })
        .await
        .unwrap();
    assert_eq!(amount, 9_000, "최종가는 역제안가");
}

#[tokio::test]
async fn declined_and_withdrawn_offers_are_terminal() {
    let (facade, _store, _clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();

    let declined = facade
        .make_offer(offer_request(listing.id, 2, 8_000))
        .await
        .unwrap();
    facade
        .decline_offer(declined.id, OfferActionRequest { actor_id: 1 })
        .await
        .unwrap();
    let err = facade
        .accept_offer(declined.id, OfferActionRequest { actor_id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    let withdrawn = facade
        .make_offer(offer_request(listing.id, 2, 8_000))
        .await
        .unwrap();
    facade
        .withdraw_offer(withdrawn.id, OfferActionRequest { actor_id: 2 })
        .await
        .unwrap();
    let err = facade
        .counter_offer(
            withdrawn.id,
            CounterOfferRequest {
                seller_id: 1,
                counter_amount: 9_000,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

/// 만료는 게으르게 집행된다: 스윕 전이라도 읽기/전이 시점에 expired 로 전이
#[tokio::test]
async fn offer_expiry_is_enforced_lazily() {
    let (facade, _store, clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();
    let offer = facade
        .make_offer(MakeOfferRequest {
            ttl_secs: Some(60),
            ..offer_request(listing.id, 2, 8_000)
        })
        .await
        .unwrap();

    clock.advance(Duration::seconds(120));
    let view = facade.offer_view(offer.id).await.unwrap();
    assert_eq!(view.status, OfferStatus::Expired);

    let err = facade
        .accept_offer(offer.id, OfferActionRequest { actor_id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

/// 스윕 훅은 만료 대상만 집계하고 멱등이다
#[tokio::test]
async fn sweep_offers_counts_expired() {
    let (facade, _store, clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();
    for buyer in [2, 3] {
        facade
            .make_offer(MakeOfferRequest {
                ttl_secs: Some(60),
                ..offer_request(listing.id, buyer, 8_000)
            })
            .await
            .unwrap();
    }
    facade
        .make_offer(offer_request(listing.id, 4, 8_000))
        .await
        .unwrap();

    clock.advance(Duration::seconds(120));
    assert_eq!(facade.sweep_offers().await, 2);
    assert_eq!(facade.sweep_offers().await, 0);
}

// endregion: --- Offers

// region:    --- Inventory

#[tokio::test]
async fn reservation_lifecycle() {
    let (facade, store, clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();

    let held = facade
        .reserve(
            listing.id,
            ReserveRequest {
                quantity: 3,
                holder: "session-a".to_string(),
                ttl_secs: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(held.status, ReservationStatus::Held);
    assert_eq!(facade.listing_view(listing.id).await.unwrap().remaining, 2);

    // 가용 수량 초과 거절에는 예약 가능 수량이 실린다
    let err = facade
        .reserve(
            listing.id,
            ReserveRequest {
                quantity: 3,
                holder: "session-b".to_string(),
                ttl_secs: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { available: 2 }));

    let committed = facade.commit_reservation(held.id).await.unwrap();
    assert_eq!(committed.status, ReservationStatus::Committed);

    // 확정된 예약은 스윕으로 풀리지 않는다
    clock.advance(Duration::hours(1));
    assert_eq!(facade.sweep_reservations().await, 0);
    assert_eq!(
        store.reservation(held.id).await.unwrap().status,
        ReservationStatus::Committed
    );

    // 해제는 멱등
    let released = facade.release_reservation(held.id).await.unwrap();
    assert_eq!(released.status, ReservationStatus::Released);
    let released = facade.release_reservation(held.id).await.unwrap();
    assert_eq!(released.status, ReservationStatus::Released);
    assert_eq!(facade.listing_view(listing.id).await.unwrap().remaining, 5);
}

/// 만료된 held 예약은 스윕 전이라도 재고를 점유하지 않고, 확정할 수 없다
#[tokio::test]
async fn expired_hold_frees_stock() {
    let (facade, _store, clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();
    let held = facade
        .reserve(
            listing.id,
            ReserveRequest {
                quantity: 5,
                holder: "session-a".to_string(),
                ttl_secs: Some(60),
            },
        )
        .await
        .unwrap();
    assert_eq!(facade.listing_view(listing.id).await.unwrap().remaining, 0);

    clock.advance(Duration::seconds(120));
    // 스윕 전이어도 가용 수량 계산에서 빠진다
    assert_eq!(facade.listing_view(listing.id).await.unwrap().remaining, 5);
    facade
        .reserve(
            listing.id,
            ReserveRequest {
                quantity: 2,
                holder: "session-b".to_string(),
                ttl_secs: None,
            },
        )
        .await
        .unwrap();

    // 만료된 보류는 확정 대신 해제된다
    let err = facade.commit_reservation(held.id).await.unwrap_err();
    assert!(matches!(err, EngineError::ReservationNotHeld { .. }));

    assert_eq!(facade.sweep_reservations().await, 0, "이미 해제됨");
}

/// 동시 예약 경쟁: 수량 5에 20명이 달려들어도 초과 판매는 없다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() {
    let (facade, store, _clock) = engine(IncrementTable::default());
    let listing = facade.create_listing(listing_request(1)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let f = facade.clone();
        let listing_id = listing.id;
        handles.push(tokio::spawn(async move {
            f.reserve(
                listing_id,
                ReserveRequest {
                    quantity: 1,
                    holder: format!("session-{i}"),
                    ttl_secs: None,
                },
            )
            .await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            granted += 1;
        }
    }
    assert_eq!(granted, 5);

    let reservations = store.reservations_for_listing(listing.id).await.unwrap();
    let held: i64 = reservations
        .iter()
        .filter(|r| r.status == ReservationStatus::Held)
        .map(|r| r.quantity)
        .sum();
    assert_eq!(held, 5);
    assert_eq!(facade.listing_view(listing.id).await.unwrap().remaining, 0);
}

// endregion: --- Inventory

// region:    --- Lock Timeout

/// 로트 조회만 지연시키는 원장 래퍼. 락 타임아웃을 결정적으로 재현하기 위한 것.
struct StallingLedger {
    inner: MemoryLedger,
    lot_delay: std::time::Duration,
}

#[async_trait]
impl LedgerStore for StallingLedger {
    async fn create_lot(&self, new: NewLot) -> bidding_engine::error::Result<Lot> {
        self.inner.create_lot(new).await
    }

    async fn lot(&self, lot_id: i64) -> bidding_engine::error::Result<Lot> {
        tokio::time::sleep(self.lot_delay).await;
        self.inner.lot(lot_id).await
    }

    async fn update_lot(
        &self,
        lot: &Lot,
        bid_status_updates: Vec<(i64, BidStatus)>,
        event: Option<NewBidEvent>,
    ) -> bidding_engine::error::Result<()> {
        self.inner.update_lot(lot, bid_status_updates, event).await
    }

    async fn lots_due(&self, now: DateTime<Utc>) -> bidding_engine::error::Result<Vec<i64>> {
        self.inner.lots_due(now).await
    }

    async fn bid(&self, bid_id: i64) -> bidding_engine::error::Result<ProxyBid> {
        self.inner.bid(bid_id).await
    }

    async fn bids_for_lot(&self, lot_id: i64) -> bidding_engine::error::Result<Vec<ProxyBid>> {
        self.inner.bids_for_lot(lot_id).await
    }

    async fn bid_events(&self, lot_id: i64) -> bidding_engine::error::Result<Vec<BidEvent>> {
        self.inner.bid_events(lot_id).await
    }

    async fn apply_bid_outcome(
        &self,
        outcome: BidOutcome,
    ) -> bidding_engine::error::Result<ProxyBid> {
        self.inner.apply_bid_outcome(outcome).await
    }

    async fn create_retraction(
        &self,
        new: NewRetraction,
    ) -> bidding_engine::error::Result<RetractionRequest> {
        self.inner.create_retraction(new).await
    }

    async fn retraction(
        &self,
        request_id: i64,
    ) -> bidding_engine::error::Result<RetractionRequest> {
        self.inner.retraction(request_id).await
    }

    async fn apply_retraction_outcome(
        &self,
        outcome: RetractionOutcome,
    ) -> bidding_engine::error::Result<()> {
        self.inner.apply_retraction_outcome(outcome).await
    }

    async fn create_offer(&self, new: NewOffer) -> bidding_engine::error::Result<Offer> {
        self.inner.create_offer(new).await
    }

    async fn offer(&self, offer_id: i64) -> bidding_engine::error::Result<Offer> {
        self.inner.offer(offer_id).await
    }

    async fn update_offer(&self, offer: &Offer) -> bidding_engine::error::Result<()> {
        self.inner.update_offer(offer).await
    }

    async fn offers_due(&self, now: DateTime<Utc>) -> bidding_engine::error::Result<Vec<i64>> {
        self.inner.offers_due(now).await
    }

    async fn create_listing(&self, new: NewListing) -> bidding_engine::error::Result<Listing> {
        self.inner.create_listing(new).await
    }

    async fn listing(&self, listing_id: i64) -> bidding_engine::error::Result<Listing> {
        self.inner.listing(listing_id).await
    }

    async fn create_reservation(
        &self,
        new: NewReservation,
    ) -> bidding_engine::error::Result<StockReservation> {
        self.inner.create_reservation(new).await
    }

    async fn reservation(
        &self,
        reservation_id: i64,
    ) -> bidding_engine::error::Result<StockReservation> {
        self.inner.reservation(reservation_id).await
    }

    async fn reservations_for_listing(
        &self,
        listing_id: i64,
    ) -> bidding_engine::error::Result<Vec<StockReservation>> {
        self.inner.reservations_for_listing(listing_id).await
    }

    async fn update_reservation(
        &self,
        reservation: &StockReservation,
    ) -> bidding_engine::error::Result<()> {
        self.inner.update_reservation(reservation).await
    }

    async fn reservations_due(
        &self,
        now: DateTime<Utc>,
    ) -> bidding_engine::error::Result<Vec<i64>> {
        self.inner.reservations_due(now).await
    }
}

/// 키 락 경합: 타임아웃 안에 락을 얻지 못한 요청은 부분 적용 없이
/// Busy(503) 로 거절되고, 먼저 락을 잡은 요청은 정상 완료된다.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_lot_lock_times_out_with_busy() {
    let store = Arc::new(StallingLedger {
        inner: MemoryLedger::new(),
        lot_delay: std::time::Duration::from_millis(500),
    });
    let clock = Arc::new(ManualClock::new(t0()));
    let facade = TransactionFacade::new(
        store,
        EventBus::default(),
        clock,
        IncrementTable::new(vec![(0, 500)]),
    )
    .with_lock_timeout(std::time::Duration::from_millis(50));

    let lot = facade.create_lot(lot_request(1, 1_000)).await.unwrap();

    // 첫 입찰이 로트 락을 잡은 채 원장 조회에서 지연된다
    let holder = facade.clone();
    let lot_id = lot.id;
    let first = tokio::spawn(async move { holder.place_bid(lot_id, bid(11, 5_000)).await });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let err = facade.place_bid(lot_id, bid(22, 6_000)).await.unwrap_err();
    assert!(matches!(err, EngineError::Busy));
    assert_eq!(err.code(), "BUSY");

    // 락을 잡고 있던 요청은 그대로 완료된다
    let (lot_after, first_bid) = first.await.unwrap().unwrap();
    assert_eq!(lot_after.leader_id, Some(11));
    assert_eq!(first_bid.status, BidStatus::Winning);

    // 경합이 끝나면 거절당했던 입찰자도 다시 시도할 수 있다
    let (retried, _) = facade.place_bid(lot_id, bid(22, 6_000)).await.unwrap();
    assert_eq!(retried.current_price, 5_500);
}

// endregion: --- Lock Timeout

// region:    --- Domain Events

/// 선두를 빼앗긴 입찰자에게 BidOutbid, 낙찰자에게 AuctionWon 이 발행된다
#[tokio::test]
async fn outbid_and_won_events_are_published() {
    let (facade, _store, clock) = engine(IncrementTable::new(vec![(0, 500)]));
    let mut rx = facade.event_bus().subscribe();
    let lot = facade.create_lot(lot_request(1, 5_000)).await.unwrap();

    facade.place_bid(lot.id, bid(11, 10_000)).await.unwrap();
    facade.place_bid(lot.id, bid(22, 20_000)).await.unwrap();

    match rx.try_recv().unwrap() {
        DomainEvent::BidOutbid {
            bidder_id,
            current_price,
            ..
        } => {
            assert_eq!(bidder_id, 11);
            assert_eq!(current_price, 10_500);
        }
        other => panic!("예상과 다른 이벤트: {other:?}"),
    }

    clock.advance(Duration::hours(2));
    facade.close_lot(lot.id).await.unwrap();
    match rx.try_recv().unwrap() {
        DomainEvent::AuctionWon {
            winner_id, price, ..
        } => {
            assert_eq!(winner_id, 22);
            assert_eq!(price, 10_500);
        }
        other => panic!("예상과 다른 이벤트: {other:?}"),
    }
}

// endregion: --- Domain Events
