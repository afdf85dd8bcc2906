/// 원장 저장소
/// 변경이 영속화되는 유일한 장소. 컴포넌트는 서로의 저장소에 직접 손대지 않고
/// 모두 이 트레이트를 통해서만 읽고 쓴다.
///
/// 다건 변경(로트 갱신 + 이벤트 추가 + 입찰 상태 갱신)은 outcome 구조체 하나로
/// 묶여 원자적으로 커밋된다. 부분 기록은 어떤 오류 경로에서도 발생하지 않는다.
// region:    --- Imports
use crate::bidding::model::{
    BidEvent, BidStatus, Listing, Lot, LotStatus, Offer, ProxyBid, RetractionRequest,
    StockReservation,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

// endregion: --- Imports

// region:    --- Write Models

/// 로트 생성 입력 (카탈로그 경계에서 넘어오는 정적 속성)
#[derive(Debug, Clone)]
pub struct NewLot {
    pub seller_id: i64,
    pub title: String,
    pub starting_price: i64,
    pub reserve_price: Option<i64>,
    pub buy_now_price: Option<i64>,
    pub close_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 리스팅 생성 입력
#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller_id: i64,
    pub title: String,
    pub price: i64,
    pub available_quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// 신규 위임 입찰
#[derive(Debug, Clone)]
pub struct NewProxyBid {
    pub lot_id: i64,
    pub bidder_id: i64,
    pub max_amount: i64,
    pub placed_at: DateTime<Utc>,
    pub status: BidStatus,
}

/// 입찰 기록 쓰기: 신규 삽입 또는 기존 입찰의 금액 인상.
/// 인상 시 placed_at 은 유지되어 동률에서 선착순 우위가 보존된다.
#[derive(Debug, Clone)]
pub enum BidWrite {
    Insert(NewProxyBid),
    Update {
        bid_id: i64,
        max_amount: i64,
        status: BidStatus,
    },
}

/// 새 호가 이벤트. seq 와 trigger_bid_id 는 저장소가 커밋 시점에 채운다.
#[derive(Debug, Clone)]
pub struct NewBidEvent {
    pub lot_id: i64,
    pub price: i64,
    pub leader_id: Option<i64>,
    /// 재연산용 제출 금액. 보정 이벤트는 None.
    pub max_at_event: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

/// 입찰 수리 한 건의 원자적 결과
#[derive(Debug, Clone)]
pub struct BidOutcome {
    /// 호가/선두/입찰 수가 갱신된 로트
    pub lot: Lot,
    pub bid: BidWrite,
    /// 새로 outbid 처리할 입찰
    pub outbid_bid_ids: Vec<i64>,
    pub event: NewBidEvent,
}

/// 철회 요청 생성 입력
#[derive(Debug, Clone)]
pub struct NewRetraction {
    pub bid_id: i64,
    pub lot_id: i64,
    pub reason_code: String,
    pub explanation: String,
    pub requested_at: DateTime<Utc>,
}

/// 철회 심사 한 건의 원자적 결과.
/// 승인이면 재연산된 로트, 입찰 상태 일괄 갱신, 보정 이벤트가 함께 실린다.
#[derive(Debug, Clone)]
pub struct RetractionOutcome {
    pub request: RetractionRequest,
    pub lot: Option<Lot>,
    pub bid_status_updates: Vec<(i64, BidStatus)>,
    pub event: Option<NewBidEvent>,
}

/// 제안 생성 입력
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub amount: i64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 예약 생성 입력
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub listing_id: i64,
    pub quantity: i64,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

// endregion: --- Write Models

// region:    --- LedgerStore Trait

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -- 로트
    async fn create_lot(&self, new: NewLot) -> Result<Lot>;
    async fn lot(&self, lot_id: i64) -> Result<Lot>;
    async fn update_lot(
        &self,
        lot: &Lot,
        bid_status_updates: Vec<(i64, BidStatus)>,
        event: Option<NewBidEvent>,
    ) -> Result<()>;
    /// 마감 시각이 지난 open 로트 (스케줄러 대상)
    async fn lots_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>>;

    // -- 위임 입찰 / 이벤트
    async fn bid(&self, bid_id: i64) -> Result<ProxyBid>;
    async fn bids_for_lot(&self, lot_id: i64) -> Result<Vec<ProxyBid>>;
    async fn bid_events(&self, lot_id: i64) -> Result<Vec<BidEvent>>;
    /// 입찰 수리 결과를 단일 트랜잭션으로 커밋하고, 기록된 입찰을 돌려준다.
    async fn apply_bid_outcome(&self, outcome: BidOutcome) -> Result<ProxyBid>;

    // -- 철회
    async fn create_retraction(&self, new: NewRetraction) -> Result<RetractionRequest>;
    async fn retraction(&self, request_id: i64) -> Result<RetractionRequest>;
    async fn apply_retraction_outcome(&self, outcome: RetractionOutcome) -> Result<()>;

    // -- 제안
    async fn create_offer(&self, new: NewOffer) -> Result<Offer>;
    async fn offer(&self, offer_id: i64) -> Result<Offer>;
    async fn update_offer(&self, offer: &Offer) -> Result<()>;
    /// 만료 시각이 지난 pending/countered 제안 (스윕 대상)
    async fn offers_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>>;

    // -- 리스팅 / 재고 예약
    async fn create_listing(&self, new: NewListing) -> Result<Listing>;
    async fn listing(&self, listing_id: i64) -> Result<Listing>;
    async fn create_reservation(&self, new: NewReservation) -> Result<StockReservation>;
    async fn reservation(&self, reservation_id: i64) -> Result<StockReservation>;
    async fn reservations_for_listing(&self, listing_id: i64) -> Result<Vec<StockReservation>>;
    async fn update_reservation(&self, reservation: &StockReservation) -> Result<()>;
    /// 만료 시각이 지난 held 예약 (스윕 대상)
    async fn reservations_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>>;
}

// endregion: --- LedgerStore Trait
