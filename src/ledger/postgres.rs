/// Postgres 원장 어댑터
/// DATABASE_URL 이 설정된 배포에서 사용한다. 쿼리는 전부 런타임 바인딩이라
/// 빌드 시점에 데이터베이스가 필요하지 않다.
///
/// outcome 단위 쓰기는 단일 트랜잭션으로 커밋한다. 파사드의 키 단위 락이
/// 요청을 직렬화하므로 여기서는 원자성만 책임진다.
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
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use tracing::info;

// endregion: --- Imports

// region:    --- Schema

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lots (
    id BIGSERIAL PRIMARY KEY,
    seller_id BIGINT NOT NULL,
    title TEXT NOT NULL,
    starting_price BIGINT NOT NULL,
    reserve_price BIGINT,
    buy_now_price BIGINT,
    close_time TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL,
    current_price BIGINT NOT NULL,
    leader_id BIGINT,
    bid_count BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS proxy_bids (
    id BIGSERIAL PRIMARY KEY,
    lot_id BIGINT NOT NULL REFERENCES lots(id),
    bidder_id BIGINT NOT NULL,
    max_amount BIGINT NOT NULL,
    placed_at TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS bid_events (
    id BIGSERIAL PRIMARY KEY,
    lot_id BIGINT NOT NULL REFERENCES lots(id),
    seq BIGINT NOT NULL,
    price BIGINT NOT NULL,
    leader_id BIGINT,
    trigger_bid_id BIGINT,
    max_at_event BIGINT,
    recorded_at TIMESTAMPTZ NOT NULL,
    UNIQUE (lot_id, seq)
);
CREATE TABLE IF NOT EXISTS retraction_requests (
    id BIGSERIAL PRIMARY KEY,
    bid_id BIGINT NOT NULL REFERENCES proxy_bids(id),
    lot_id BIGINT NOT NULL REFERENCES lots(id),
    reason_code TEXT NOT NULL,
    explanation TEXT NOT NULL,
    status TEXT NOT NULL,
    reviewer_note TEXT,
    requested_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS listings (
    id BIGSERIAL PRIMARY KEY,
    seller_id BIGINT NOT NULL,
    title TEXT NOT NULL,
    price BIGINT NOT NULL,
    available_quantity BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS offers (
    id BIGSERIAL PRIMARY KEY,
    listing_id BIGINT NOT NULL REFERENCES listings(id),
    buyer_id BIGINT NOT NULL,
    seller_id BIGINT NOT NULL,
    amount BIGINT NOT NULL,
    counter_amount BIGINT,
    message TEXT,
    status TEXT NOT NULL,
    override_used BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS stock_reservations (
    id BIGSERIAL PRIMARY KEY,
    listing_id BIGINT NOT NULL REFERENCES listings(id),
    quantity BIGINT NOT NULL,
    holder TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL
)
"#;

// endregion: --- Schema

// region:    --- Row Mapping

fn parse_status<T>(raw: String) -> Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse().map_err(EngineError::Store)
}

fn lot_from_row(row: &PgRow) -> Result<Lot> {
    Ok(Lot {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        title: row.try_get("title")?,
        starting_price: row.try_get("starting_price")?,
        reserve_price: row.try_get("reserve_price")?,
        buy_now_price: row.try_get("buy_now_price")?,
        close_time: row.try_get("close_time")?,
        status: parse_status::<LotStatus>(row.try_get("status")?)?,
        current_price: row.try_get("current_price")?,
        leader_id: row.try_get("leader_id")?,
        bid_count: row.try_get("bid_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn bid_from_row(row: &PgRow) -> Result<ProxyBid> {
    Ok(ProxyBid {
        id: row.try_get("id")?,
        lot_id: row.try_get("lot_id")?,
        bidder_id: row.try_get("bidder_id")?,
        max_amount: row.try_get("max_amount")?,
        placed_at: row.try_get("placed_at")?,
        status: parse_status::<BidStatus>(row.try_get("status")?)?,
    })
}

fn event_from_row(row: &PgRow) -> Result<BidEvent> {
    Ok(BidEvent {
        id: row.try_get("id")?,
        lot_id: row.try_get("lot_id")?,
        seq: row.try_get("seq")?,
        price: row.try_get("price")?,
        leader_id: row.try_get("leader_id")?,
        trigger_bid_id: row.try_get("trigger_bid_id")?,
        max_at_event: row.try_get("max_at_event")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn retraction_from_row(row: &PgRow) -> Result<RetractionRequest> {
    Ok(RetractionRequest {
        id: row.try_get("id")?,
        bid_id: row.try_get("bid_id")?,
        lot_id: row.try_get("lot_id")?,
        reason_code: row.try_get("reason_code")?,
        explanation: row.try_get("explanation")?,
        status: parse_status::<RetractionStatus>(row.try_get("status")?)?,
        reviewer_note: row.try_get("reviewer_note")?,
        requested_at: row.try_get("requested_at")?,
    })
}

fn listing_from_row(row: &PgRow) -> Result<Listing> {
    Ok(Listing {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        title: row.try_get("title")?,
        price: row.try_get("price")?,
        available_quantity: row.try_get("available_quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn offer_from_row(row: &PgRow) -> Result<Offer> {
    Ok(Offer {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        buyer_id: row.try_get("buyer_id")?,
        seller_id: row.try_get("seller_id")?,
        amount: row.try_get("amount")?,
        counter_amount: row.try_get("counter_amount")?,
        message: row.try_get("message")?,
        status: parse_status::<OfferStatus>(row.try_get("status")?)?,
        override_used: row.try_get("override_used")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<StockReservation> {
    Ok(StockReservation {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        quantity: row.try_get("quantity")?,
        holder: row.try_get("holder")?,
        expires_at: row.try_get("expires_at")?,
        status: parse_status::<ReservationStatus>(row.try_get("status")?)?,
    })
}

// endregion: --- Row Mapping

// region:    --- PgLedger

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// 접속 풀 생성
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// 스키마 초기화 (멱등)
    pub async fn initialize_schema(&self) -> Result<()> {
        for statement in CREATE_SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        info!("{:<12} --> 원장 스키마 초기화 완료", "PgLedger");
        Ok(())
    }

    async fn fetch_lot(&self, lot_id: i64) -> Result<Lot> {
        let row = sqlx::query("SELECT * FROM lots WHERE id = $1")
            .bind(lot_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "로트",
                id: lot_id,
            })?;
        lot_from_row(&row)
    }

    /// 로트별 엄격 증가 seq 로 이벤트를 덧붙인다 (트랜잭션 내부 전용).
    async fn append_event_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &NewBidEvent,
        trigger_bid_id: Option<i64>,
    ) -> Result<()> {
        let seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM bid_events WHERE lot_id = $1")
                .bind(event.lot_id)
                .fetch_one(&mut **tx)
                .await?;
        sqlx::query(
            "INSERT INTO bid_events (lot_id, seq, price, leader_id, trigger_bid_id, max_at_event, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.lot_id)
        .bind(seq)
        .bind(event.price)
        .bind(event.leader_id)
        .bind(trigger_bid_id)
        .bind(event.max_at_event)
        .bind(event.recorded_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_lot_tx(tx: &mut Transaction<'_, Postgres>, lot: &Lot) -> Result<()> {
        sqlx::query(
            "UPDATE lots SET status = $1, current_price = $2, leader_id = $3, bid_count = $4
             WHERE id = $5",
        )
        .bind(lot.status.as_str())
        .bind(lot.current_price)
        .bind(lot.leader_id)
        .bind(lot.bid_count)
        .bind(lot.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_bid_statuses_tx(
        tx: &mut Transaction<'_, Postgres>,
        updates: &[(i64, BidStatus)],
    ) -> Result<()> {
        for (bid_id, status) in updates {
            sqlx::query("UPDATE proxy_bids SET status = $1 WHERE id = $2")
                .bind(status.as_str())
                .bind(bid_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    // -- 로트

    async fn create_lot(&self, new: NewLot) -> Result<Lot> {
        let row = sqlx::query(
            "INSERT INTO lots (seller_id, title, starting_price, reserve_price, buy_now_price,
                               close_time, status, current_price, leader_id, bid_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $3, NULL, 0, $8)
             RETURNING *",
        )
        .bind(new.seller_id)
        .bind(&new.title)
        .bind(new.starting_price)
        .bind(new.reserve_price)
        .bind(new.buy_now_price)
        .bind(new.close_time)
        .bind(LotStatus::Open.as_str())
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await?;
        lot_from_row(&row)
    }

    async fn lot(&self, lot_id: i64) -> Result<Lot> {
        self.fetch_lot(lot_id).await
    }

    async fn update_lot(
        &self,
        lot: &Lot,
        bid_status_updates: Vec<(i64, BidStatus)>,
        event: Option<NewBidEvent>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::update_lot_tx(&mut tx, lot).await?;
        Self::set_bid_statuses_tx(&mut tx, &bid_status_updates).await?;
        if let Some(event) = event {
            Self::append_event_tx(&mut tx, &event, None).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn lots_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM lots WHERE status = 'open' AND close_time <= $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- 위임 입찰 / 이벤트

    async fn bid(&self, bid_id: i64) -> Result<ProxyBid> {
        let row = sqlx::query("SELECT * FROM proxy_bids WHERE id = $1")
            .bind(bid_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "입찰",
                id: bid_id,
            })?;
        bid_from_row(&row)
    }

    async fn bids_for_lot(&self, lot_id: i64) -> Result<Vec<ProxyBid>> {
        let rows = sqlx::query("SELECT * FROM proxy_bids WHERE lot_id = $1 ORDER BY id")
            .bind(lot_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(bid_from_row).collect()
    }

    async fn bid_events(&self, lot_id: i64) -> Result<Vec<BidEvent>> {
        let rows = sqlx::query("SELECT * FROM bid_events WHERE lot_id = $1 ORDER BY seq")
            .bind(lot_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn apply_bid_outcome(&self, outcome: BidOutcome) -> Result<ProxyBid> {
        let mut tx = self.pool.begin().await?;

        let bid = match outcome.bid {
            BidWrite::Insert(new) => {
                let row = sqlx::query(
                    "INSERT INTO proxy_bids (lot_id, bidder_id, max_amount, placed_at, status)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING *",
                )
                .bind(new.lot_id)
                .bind(new.bidder_id)
                .bind(new.max_amount)
                .bind(new.placed_at)
                .bind(new.status.as_str())
                .fetch_one(&mut *tx)
                .await?;
                bid_from_row(&row)?
            }
            BidWrite::Update {
                bid_id,
                max_amount,
                status,
            } => {
                let row = sqlx::query(
                    "UPDATE proxy_bids SET max_amount = $1, status = $2 WHERE id = $3
                     RETURNING *",
                )
                .bind(max_amount)
                .bind(status.as_str())
                .bind(bid_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(EngineError::NotFound {
                    kind: "입찰",
                    id: bid_id,
                })?;
                bid_from_row(&row)?
            }
        };

        let outbid: Vec<(i64, BidStatus)> = outcome
            .outbid_bid_ids
            .iter()
            .map(|id| (*id, BidStatus::Outbid))
            .collect();
        Self::set_bid_statuses_tx(&mut tx, &outbid).await?;
        Self::append_event_tx(&mut tx, &outcome.event, Some(bid.id)).await?;
        Self::update_lot_tx(&mut tx, &outcome.lot).await?;

        tx.commit().await?;
        Ok(bid)
    }

    // -- 철회

    async fn create_retraction(&self, new: NewRetraction) -> Result<RetractionRequest> {
        let row = sqlx::query(
            "INSERT INTO retraction_requests (bid_id, lot_id, reason_code, explanation, status, requested_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(new.bid_id)
        .bind(new.lot_id)
        .bind(&new.reason_code)
        .bind(&new.explanation)
        .bind(RetractionStatus::Pending.as_str())
        .bind(new.requested_at)
        .fetch_one(&self.pool)
        .await?;
        retraction_from_row(&row)
    }

    async fn retraction(&self, request_id: i64) -> Result<RetractionRequest> {
        let row = sqlx::query("SELECT * FROM retraction_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "철회 요청",
                id: request_id,
            })?;
        retraction_from_row(&row)
    }

    async fn apply_retraction_outcome(&self, outcome: RetractionOutcome) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE retraction_requests SET status = $1, reviewer_note = $2 WHERE id = $3")
            .bind(outcome.request.status.as_str())
            .bind(&outcome.request.reviewer_note)
            .bind(outcome.request.id)
            .execute(&mut *tx)
            .await?;
        Self::set_bid_statuses_tx(&mut tx, &outcome.bid_status_updates).await?;
        if let Some(event) = &outcome.event {
            Self::append_event_tx(&mut tx, event, None).await?;
        }
        if let Some(lot) = &outcome.lot {
            Self::update_lot_tx(&mut tx, lot).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // -- 제안

    async fn create_offer(&self, new: NewOffer) -> Result<Offer> {
        let row = sqlx::query(
            "INSERT INTO offers (listing_id, buyer_id, seller_id, amount, message, status, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(new.listing_id)
        .bind(new.buyer_id)
        .bind(new.seller_id)
        .bind(new.amount)
        .bind(&new.message)
        .bind(OfferStatus::Pending.as_str())
        .bind(new.created_at)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;
        offer_from_row(&row)
    }

    async fn offer(&self, offer_id: i64) -> Result<Offer> {
        let row = sqlx::query("SELECT * FROM offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "제안",
                id: offer_id,
            })?;
        offer_from_row(&row)
    }

    async fn update_offer(&self, offer: &Offer) -> Result<()> {
        sqlx::query(
            "UPDATE offers SET status = $1, counter_amount = $2, override_used = $3 WHERE id = $4",
        )
        .bind(offer.status.as_str())
        .bind(offer.counter_amount)
        .bind(offer.override_used)
        .bind(offer.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn offers_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM offers
             WHERE status IN ('pending', 'countered') AND expires_at < $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- 리스팅 / 재고 예약

    async fn create_listing(&self, new: NewListing) -> Result<Listing> {
        let row = sqlx::query(
            "INSERT INTO listings (seller_id, title, price, available_quantity, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(new.seller_id)
        .bind(&new.title)
        .bind(new.price)
        .bind(new.available_quantity)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await?;
        listing_from_row(&row)
    }

    async fn listing(&self, listing_id: i64) -> Result<Listing> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = $1")
            .bind(listing_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "리스팅",
                id: listing_id,
            })?;
        listing_from_row(&row)
    }

    async fn create_reservation(&self, new: NewReservation) -> Result<StockReservation> {
        let row = sqlx::query(
            "INSERT INTO stock_reservations (listing_id, quantity, holder, expires_at, status)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(new.listing_id)
        .bind(new.quantity)
        .bind(&new.holder)
        .bind(new.expires_at)
        .bind(ReservationStatus::Held.as_str())
        .fetch_one(&self.pool)
        .await?;
        reservation_from_row(&row)
    }

    async fn reservation(&self, reservation_id: i64) -> Result<StockReservation> {
        let row = sqlx::query("SELECT * FROM stock_reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound {
                kind: "예약",
                id: reservation_id,
            })?;
        reservation_from_row(&row)
    }

    async fn reservations_for_listing(&self, listing_id: i64) -> Result<Vec<StockReservation>> {
        let rows = sqlx::query("SELECT * FROM stock_reservations WHERE listing_id = $1 ORDER BY id")
            .bind(listing_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(reservation_from_row).collect()
    }

    async fn update_reservation(&self, reservation: &StockReservation) -> Result<()> {
        sqlx::query("UPDATE stock_reservations SET status = $1, expires_at = $2 WHERE id = $3")
            .bind(reservation.status.as_str())
            .bind(reservation.expires_at)
            .bind(reservation.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reservations_due(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM stock_reservations
             WHERE status = 'held' AND expires_at < $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// endregion: --- PgLedger
