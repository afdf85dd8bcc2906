/// 읽기 프로젝션
/// 원장 레코드를 외부 공개용 뷰로 변환한다. 변경 권한이 없고,
/// 마지막 커밋 상태를 락 없이 읽는다 (이벤트는 append-only 라 찢긴 읽기가 없다).
///
/// 비밀 유지: 위임 입찰의 최대 금액과 내정가는 어떤 뷰에도 싣지 않으며,
/// 선두 식별자는 마스킹해서 내보낸다.
// region:    --- Imports
use crate::bidding::model::{BidEvent, Listing, Lot, LotStatus, Offer, OfferStatus, StockReservation};
use crate::increment::IncrementTable;
use crate::inventory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Views

/// 로트 공개 뷰
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LotView {
    pub lot_id: i64,
    pub status: LotStatus,
    pub current_price: i64,
    pub bid_count: i64,
    /// 마스킹된 선두 식별자
    pub leader: Option<String>,
    pub minimum_next_bid: i64,
    pub buy_now_price: Option<i64>,
    pub close_time: DateTime<Utc>,
}

/// 호가 이력 한 줄
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BidEventView {
    pub seq: i64,
    pub price: i64,
    pub leader: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// 제안 공개 뷰
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OfferView {
    pub offer_id: i64,
    pub status: OfferStatus,
    pub amount: i64,
    pub counter_amount: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

/// 리스팅 재고 뷰
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListingView {
    pub listing_id: i64,
    pub price: i64,
    pub available_quantity: i64,
    pub reserved_quantity: i64,
    pub remaining: i64,
}

// endregion: --- Views

// region:    --- Projections

/// 식별자 마스킹: 끝 두 자리만 남긴다.
pub fn mask_bidder(bidder_id: i64) -> String {
    format!("***{:02}", bidder_id.rem_euclid(100))
}

pub fn project_lot(lot: &Lot, table: &IncrementTable) -> LotView {
    LotView {
        lot_id: lot.id,
        status: lot.status,
        current_price: lot.current_price,
        bid_count: lot.bid_count,
        leader: lot.leader_id.map(mask_bidder),
        minimum_next_bid: table.minimum_next_bid(
            lot.current_price,
            lot.starting_price,
            lot.leader_id.is_some(),
        ),
        buy_now_price: lot.buy_now_price,
        close_time: lot.close_time,
    }
}

pub fn project_events(events: &[BidEvent]) -> Vec<BidEventView> {
    events
        .iter()
        .map(|e| BidEventView {
            seq: e.seq,
            price: e.price,
            leader: e.leader_id.map(mask_bidder),
            recorded_at: e.recorded_at,
        })
        .collect()
}

pub fn project_offer(offer: &Offer) -> OfferView {
    OfferView {
        offer_id: offer.id,
        status: offer.status,
        amount: offer.amount,
        counter_amount: offer.counter_amount,
        expires_at: offer.expires_at,
    }
}

pub fn project_listing(
    listing: &Listing,
    reservations: &[StockReservation],
    now: DateTime<Utc>,
) -> ListingView {
    let reserved = inventory::occupied_quantity(reservations, now);
    ListingView {
        listing_id: listing.id,
        price: listing.price,
        available_quantity: listing.available_quantity,
        reserved_quantity: reserved,
        remaining: listing.available_quantity - reserved,
    }
}

// endregion: --- Projections
