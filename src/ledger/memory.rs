/// 인메모리 원장 어댑터
/// 기본 실행/테스트 경로. 레코드 전체를 RwLock 하나로 감싸므로
/// outcome 단위 쓰기는 자연스럽게 원자적이다.
// region:    --- Imports
use crate::bidding::model::{
    BidEvent, BidStatus, Listing, Lot, LotStatus, Offer, OfferStatus, ProxyBid, ReservationStatus,
    RetractionRequest, RetractionStatus, StockReservation,
};
use crate::error::{EngineError, Result};
use crate::ledger::{
    BidOutcome, BidWrite, LedgerStore, NewBidEvent, NewListing, NewLot, NewOffer, NewReservation,
    NewRetraction, RetractionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

// endregion: --- Imports

// region:    --- MemoryLedger

#[derive(Default)]
struct Inner {
    next_id: i64,
    lots: HashMap<i64, Lot>,
    bids: HashMap<i64, ProxyBid>,
    /// 로트별 이벤트, seq 오름차순 유지
    events: HashMap<i64, Vec<BidEvent>>,
    retractions: HashMap<i64, RetractionRequest>,
    offers: HashMap<i64, Offer>,
    listings: HashMap<i64, Listing>,
    reservations: HashMap<i64, StockReservation>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// 로트별 엄격 증가 seq 로 이벤트를 덧붙인다.
    fn append_event(&mut self, new: NewBidEvent, trigger_bid_id: Option<i64>) -> BidEvent {
        let id = self.next_id();
        let log = self.events.entry(new.lot_id).or_default();
        let seq = log.last().map(|e| e.seq).unwrap_or(0) + 1;
        let event = BidEvent {
            id,
            lot_id: new.lot_id,
            seq,
            price: new.price,
            leader_id: new.leader_id,
            trigger_bid_id,
            max_at_event: new.max_at_event,
            recorded_at: new.recorded_at,
        };
        log.push(event.clone());
        event
    }

    fn set_bid_statuses(&mut self, updates: &[(i64, BidStatus)]) {
        for (bid_id, status) in updates {
            if let Some(bid) = self.bids.get_mut(bid_id) {
                bid.status = *status;
            }
        }
    }
}

pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    // -- 로트

    async fn create_lot(&self, new: NewLot) -> Result<Lot> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let lot = Lot {
            id,
            seller_id: new.seller_id,
            title: new.title,
            starting_price: new.starting_price,
            reserve_price: new.reserve_price,
            buy_now_price: new.buy_now_price,
            close_time: new.close_time,
            status: LotStatus::Open,
            current_price: new.starting_price,
            leader_id: None,
            bid_count: 0,
            created_at: new.created_at,
        };
        inner.lots.insert(id, lot.clone());
        Ok(lot)
    }

    async fn lot(&self, lot_id: i64) -> Result<Lot> {
        let inner = self.inner.read().await;
        inner
            .lots
            .get(&lot_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                kind: "로트",
                id: lot_id,
            })
    }

    async fn update_lot(
        &self,
        lot: &Lot,
        bid_status_updates: Vec<(i64, BidStatus)>,
        event: Option<NewBidEvent>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.lots.contains_key(&lot.id) {
            return Err(EngineError::NotFound {
                kind: "로트",
                id: lot.id,
            });
        }
        inner.lots.insert(lot.id, lot.clone());
        inner.set_bid_statuses(&bid_status_updates);
        if let Some(event) = event {
            inner.append_event(event, None);
        }
        Ok(())
    }

    async fn lots_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let inner = self.inner.read().await;
        let mut due: Vec<i64> = inner
            .lots
            .values()
            .filter(|l| l.status == LotStatus::Open && l.close_time <= now)
            .map(|l| l.id)
            .collect();
        due.sort_unstable();
        Ok(due)
    }

    // -- 위임 입찰 / 이벤트

    async fn bid(&self, bid_id: i64) -> Result<ProxyBid> {
        let inner = self.inner.read().await;
        inner
            .bids
            .get(&bid_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                kind: "입찰",
                id: bid_id,
            })
    }

    async fn bids_for_lot(&self, lot_id: i64) -> Result<Vec<ProxyBid>> {
        let inner = self.inner.read().await;
        let mut bids: Vec<ProxyBid> = inner
            .bids
            .values()
            .filter(|b| b.lot_id == lot_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| b.id);
        Ok(bids)
    }

    async fn bid_events(&self, lot_id: i64) -> Result<Vec<BidEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.events.get(&lot_id).cloned().unwrap_or_default())
    }

    async fn apply_bid_outcome(&self, outcome: BidOutcome) -> Result<ProxyBid> {
        let mut inner = self.inner.write().await;
        if !inner.lots.contains_key(&outcome.lot.id) {
            return Err(EngineError::NotFound {
                kind: "로트",
                id: outcome.lot.id,
            });
        }

        let bid = match outcome.bid {
            BidWrite::Insert(new) => {
                let id = inner.next_id();
                let bid = ProxyBid {
                    id,
                    lot_id: new.lot_id,
                    bidder_id: new.bidder_id,
                    max_amount: new.max_amount,
                    placed_at: new.placed_at,
                    status: new.status,
                };
                inner.bids.insert(id, bid.clone());
                bid
            }
            BidWrite::Update {
                bid_id,
                max_amount,
                status,
            } => {
                let bid = inner.bids.get_mut(&bid_id).ok_or(EngineError::NotFound {
                    kind: "입찰",
                    id: bid_id,
                })?;
                bid.max_amount = max_amount;
                bid.status = status;
                bid.clone()
            }
        };

        let outbid: Vec<(i64, BidStatus)> = outcome
            .outbid_bid_ids
            .iter()
            .map(|id| (*id, BidStatus::Outbid))
            .collect();
        inner.set_bid_statuses(&outbid);
        inner.append_event(outcome.event, Some(bid.id));
        inner.lots.insert(outcome.lot.id, outcome.lot);
        Ok(bid)
    }

    // -- 철회

    async fn create_retraction(&self, new: NewRetraction) -> Result<RetractionRequest> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let request = RetractionRequest {
            id,
            bid_id: new.bid_id,
            lot_id: new.lot_id,
            reason_code: new.reason_code,
            explanation: new.explanation,
            status: RetractionStatus::Pending,
            reviewer_note: None,
            requested_at: new.requested_at,
        };
        inner.retractions.insert(id, request.clone());
        Ok(request)
    }

    async fn retraction(&self, request_id: i64) -> Result<RetractionRequest> {
        let inner = self.inner.read().await;
        inner
            .retractions
            .get(&request_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                kind: "철회 요청",
                id: request_id,
            })
    }

    async fn apply_retraction_outcome(&self, outcome: RetractionOutcome) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .retractions
            .insert(outcome.request.id, outcome.request.clone());
        inner.set_bid_statuses(&outcome.bid_status_updates);
        if let Some(event) = outcome.event {
            inner.append_event(event, None);
        }
        if let Some(lot) = outcome.lot {
            inner.lots.insert(lot.id, lot);
        }
        Ok(())
    }

    // -- 제안

    async fn create_offer(&self, new: NewOffer) -> Result<Offer> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let offer = Offer {
            id,
            listing_id: new.listing_id,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            amount: new.amount,
            counter_amount: None,
            message: new.message,
            status: OfferStatus::Pending,
            override_used: false,
            created_at: new.created_at,
            expires_at: new.expires_at,
        };
        inner.offers.insert(id, offer.clone());
        Ok(offer)
    }

    async fn offer(&self, offer_id: i64) -> Result<Offer> {
        let inner = self.inner.read().await;
        inner
            .offers
            .get(&offer_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                kind: "제안",
                id: offer_id,
            })
    }

    async fn update_offer(&self, offer: &Offer) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.offers.contains_key(&offer.id) {
            return Err(EngineError::NotFound {
                kind: "제안",
                id: offer.id,
            });
        }
        inner.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn offers_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let inner = self.inner.read().await;
        let mut due: Vec<i64> = inner
            .offers
            .values()
            .filter(|o| {
                matches!(o.status, OfferStatus::Pending | OfferStatus::Countered)
                    && o.expires_at < now
            })
            .map(|o| o.id)
            .collect();
        due.sort_unstable();
        Ok(due)
    }

    // -- 리스팅 / 재고 예약

    async fn create_listing(&self, new: NewListing) -> Result<Listing> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let listing = Listing {
            id,
            seller_id: new.seller_id,
            title: new.title,
            price: new.price,
            available_quantity: new.available_quantity,
            created_at: new.created_at,
        };
        inner.listings.insert(id, listing.clone());
        Ok(listing)
    }

    async fn listing(&self, listing_id: i64) -> Result<Listing> {
        let inner = self.inner.read().await;
        inner
            .listings
            .get(&listing_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                kind: "리스팅",
                id: listing_id,
            })
    }

    async fn create_reservation(&self, new: NewReservation) -> Result<StockReservation> {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let reservation = StockReservation {
            id,
            listing_id: new.listing_id,
            quantity: new.quantity,
            holder: new.holder,
            expires_at: new.expires_at,
            status: ReservationStatus::Held,
        };
        inner.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    async fn reservation(&self, reservation_id: i64) -> Result<StockReservation> {
        let inner = self.inner.read().await;
        inner
            .reservations
            .get(&reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound {
                kind: "예약",
                id: reservation_id,
            })
    }

    async fn reservations_for_listing(&self, listing_id: i64) -> Result<Vec<StockReservation>> {
        let inner = self.inner.read().await;
        let mut reservations: Vec<StockReservation> = inner
            .reservations
            .values()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.id);
        Ok(reservations)
    }

    async fn update_reservation(&self, reservation: &StockReservation) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.reservations.contains_key(&reservation.id) {
            return Err(EngineError::NotFound {
                kind: "예약",
                id: reservation.id,
            });
        }
        inner.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn reservations_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let inner = self.inner.read().await;
        let mut due: Vec<i64> = inner
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Held && r.expires_at < now)
            .map(|r| r.id)
            .collect();
        due.sort_unstable();
        Ok(due)
    }
}

// endregion: --- MemoryLedger
