/// 재고 예약 관리자
/// 고정가/수량 리스팅에서 동시 구매자가 재고를 초과 판매하지 못하게 한다.
///
/// 불변식: held + committed 예약 수량의 합 ≤ 리스팅 가용 수량.
/// 가용성 확인과 예약 생성은 파사드의 리스팅 락 아래에서 한 단위로 일어나므로
/// read-then-write 경쟁이 없다.
// region:    --- Imports
use crate::bidding::model::{amount_in_range, Listing, ReservationStatus, StockReservation};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::ledger::{LedgerStore, NewReservation};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

// endregion: --- Imports

// region:    --- Requests

/// 리스팅 생성 요청 (카탈로그 경계)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateListingRequest {
    pub seller_id: i64,
    pub title: String,
    pub price: i64,
    pub available_quantity: i64,
}

/// 재고 예약 요청
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReserveRequest {
    pub quantity: i64,
    /// 세션 혹은 구매자 식별자
    pub holder: String,
    /// 보류 유지 시간(초). 생략 시 15분.
    pub ttl_secs: Option<i64>,
}

const DEFAULT_RESERVATION_TTL_MINS: i64 = 15;

// endregion: --- Requests

// region:    --- Inventory Commands

/// 리스팅 생성
pub async fn create_listing(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    req: CreateListingRequest,
) -> Result<Listing> {
    if !amount_in_range(req.price) || req.available_quantity <= 0 {
        return Err(EngineError::InvalidAmount);
    }
    let listing = store
        .create_listing(crate::ledger::NewListing {
            seller_id: req.seller_id,
            title: req.title,
            price: req.price,
            available_quantity: req.available_quantity,
            created_at: clock.now(),
        })
        .await?;
    info!("{:<12} --> 리스팅 생성: id={}", "Inventory", listing.id);
    Ok(listing)
}

/// 현재 재고를 점유 중인 수량 합계
pub fn occupied_quantity(reservations: &[StockReservation], now: DateTime<Utc>) -> i64 {
    reservations
        .iter()
        .filter(|r| r.occupies_stock(now))
        .map(|r| r.quantity)
        .sum()
}

/// 재고 예약: 가용 수량 확인과 생성을 한 단위로 처리한다 (리스팅 락 내부).
pub async fn reserve(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    listing_id: i64,
    req: ReserveRequest,
) -> Result<StockReservation> {
    if req.quantity <= 0 {
        return Err(EngineError::InvalidAmount);
    }
    let listing = store.listing(listing_id).await?;
    let now = clock.now();
    let reservations = store.reservations_for_listing(listing_id).await?;
    let occupied = occupied_quantity(&reservations, now);
    let available = listing.available_quantity - occupied;
    if req.quantity > available {
        return Err(EngineError::InsufficientStock { available });
    }

    let ttl = req
        .ttl_secs
        .map(Duration::seconds)
        .unwrap_or_else(|| Duration::minutes(DEFAULT_RESERVATION_TTL_MINS));
    let reservation = store
        .create_reservation(NewReservation {
            listing_id,
            quantity: req.quantity,
            holder: req.holder,
            expires_at: now + ttl,
        })
        .await?;
    info!(
        "{:<12} --> 재고 예약: reservation={}, listing={}, 수량={}",
        "Inventory", reservation.id, listing_id, reservation.quantity
    );
    Ok(reservation)
}

/// 확정: held 상태(만료 전)에서만 유효하다.
/// 확정된 예약은 스윕으로 풀리지 않으며, 외부 주문 취소 플로우의 명시적
/// release 호출로만 되돌아간다.
pub async fn commit(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    reservation_id: i64,
) -> Result<StockReservation> {
    let mut reservation = store.reservation(reservation_id).await?;
    let now = clock.now();
    if reservation.status != ReservationStatus::Held {
        return Err(EngineError::ReservationNotHeld {
            status: reservation.status.to_string(),
        });
    }
    if now > reservation.expires_at {
        // 만료된 보류는 확정 대신 즉시 해제한다.
        reservation.status = ReservationStatus::Released;
        store.update_reservation(&reservation).await?;
        return Err(EngineError::ReservationNotHeld {
            status: reservation.status.to_string(),
        });
    }
    reservation.status = ReservationStatus::Committed;
    store.update_reservation(&reservation).await?;
    info!(
        "{:<12} --> 예약 확정: reservation={}",
        "Inventory", reservation_id
    );
    Ok(reservation)
}

/// 해제: held/committed 모두 허용, 이미 해제된 예약에는 멱등.
pub async fn release(
    store: &dyn LedgerStore,
    reservation_id: i64,
) -> Result<StockReservation> {
    let mut reservation = store.reservation(reservation_id).await?;
    if reservation.status == ReservationStatus::Released {
        return Ok(reservation);
    }
    reservation.status = ReservationStatus::Released;
    store.update_reservation(&reservation).await?;
    info!(
        "{:<12} --> 예약 해제: reservation={}",
        "Inventory", reservation_id
    );
    Ok(reservation)
}

/// 스윕 경로: 만료된 held 예약 하나를 해제한다 (멱등).
pub async fn sweep_reservation(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    reservation_id: i64,
) -> Result<bool> {
    let mut reservation = store.reservation(reservation_id).await?;
    if reservation.status == ReservationStatus::Held && clock.now() > reservation.expires_at {
        reservation.status = ReservationStatus::Released;
        store.update_reservation(&reservation).await?;
        info!(
            "{:<12} --> 만료 예약 해제: reservation={}",
            "Inventory", reservation_id
        );
        return Ok(true);
    }
    Ok(false)
}

// endregion: --- Inventory Commands
