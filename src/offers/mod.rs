/// 가격 제안 상태 기계
/// pending → {accepted, declined, countered, withdrawn, expired}
/// countered → {accepted(구매자), withdrawn, expired}
/// 구매자 재역제안은 없는 1단계 협상 모델이다.
///
/// 만료는 게으르게 집행한다: pending/countered 제안을 읽거나 전이시키기 전에
/// 항상 만료 여부를 먼저 확인해 expired 전이를 강제하므로, 스케줄러 스윕은
/// 알림 목적일 뿐 정합성에 필수가 아니다.
// region:    --- Imports
use crate::auction::events::DomainEvent;
use crate::bidding::model::{amount_in_range, Offer, OfferStatus};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::ledger::{LedgerStore, NewOffer};
use crate::notifier::EventBus;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

// endregion: --- Imports

// region:    --- Requests

/// 제안 생성 요청
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MakeOfferRequest {
    pub listing_id: i64,
    pub buyer_id: i64,
    pub amount: i64,
    pub message: Option<String>,
    /// 만료까지의 시간(초). 생략 시 48시간.
    pub ttl_secs: Option<i64>,
}

/// 역제안 요청 (판매자)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CounterOfferRequest {
    pub seller_id: i64,
    pub counter_amount: i64,
}

/// 수락/거절/철회 공통: 행위자 식별자만 받는다.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OfferActionRequest {
    pub actor_id: i64,
}

const DEFAULT_OFFER_TTL_HOURS: i64 = 48;

// endregion: --- Requests

// region:    --- Offer Commands

/// 제안 생성. 구매자 ↔ 판매자 당사자만 이후 전이를 일으킬 수 있다.
pub async fn make_offer(
    store: &dyn LedgerStore,
    bus: &EventBus,
    clock: &dyn Clock,
    req: MakeOfferRequest,
) -> Result<Offer> {
    if !amount_in_range(req.amount) {
        return Err(EngineError::InvalidAmount);
    }
    let listing = store.listing(req.listing_id).await?;
    if req.buyer_id == listing.seller_id {
        return Err(EngineError::SelfBid);
    }
    let now = clock.now();
    let ttl = req
        .ttl_secs
        .map(Duration::seconds)
        .unwrap_or_else(|| Duration::hours(DEFAULT_OFFER_TTL_HOURS));

    let offer = store
        .create_offer(NewOffer {
            listing_id: req.listing_id,
            buyer_id: req.buyer_id,
            seller_id: listing.seller_id,
            amount: req.amount,
            message: req.message,
            created_at: now,
            expires_at: now + ttl,
        })
        .await?;

    bus.publish(DomainEvent::OfferReceived {
        offer_id: offer.id,
        listing_id: offer.listing_id,
        seller_id: offer.seller_id,
        amount: offer.amount,
        timestamp: now,
    });
    info!(
        "{:<12} --> 제안 접수: offer={}, listing={}, 금액={}",
        "Offer", offer.id, offer.listing_id, offer.amount
    );
    Ok(offer)
}

/// 만료 시각이 지난 pending/countered 제안을 expired 로 강제 전이한다.
/// 전이가 일어났으면 true.
async fn enforce_expiry(store: &dyn LedgerStore, clock: &dyn Clock, offer: &mut Offer) -> Result<bool> {
    if matches!(offer.status, OfferStatus::Pending | OfferStatus::Countered)
        && clock.now() > offer.expires_at
    {
        offer.status = OfferStatus::Expired;
        store.update_offer(offer).await?;
        info!("{:<12} --> 제안 만료 처리: offer={}", "Offer", offer.id);
        return Ok(true);
    }
    Ok(false)
}

/// 읽기 경로용: 만료를 집행한 뒤의 제안을 돌려준다.
pub async fn load_offer(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offer_id: i64,
) -> Result<Offer> {
    let mut offer = store.offer(offer_id).await?;
    enforce_expiry(store, clock, &mut offer).await?;
    Ok(offer)
}

fn invalid(offer: &Offer, action: &str) -> EngineError {
    EngineError::InvalidTransition {
        from: offer.status.to_string(),
        action: action.to_string(),
    }
}

/// 수락: pending 은 판매자가, countered 는 구매자가 수락할 수 있다.
pub async fn accept_offer(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offer_id: i64,
    req: OfferActionRequest,
) -> Result<Offer> {
    let mut offer = load_offer(store, clock, offer_id).await?;
    match offer.status {
        OfferStatus::Pending => {
            if req.actor_id != offer.seller_id {
                return Err(EngineError::Forbidden);
            }
        }
        OfferStatus::Countered => {
            if req.actor_id != offer.buyer_id {
                return Err(EngineError::Forbidden);
            }
        }
        _ => return Err(invalid(&offer, "수락")),
    }
    offer.status = OfferStatus::Accepted;
    store.update_offer(&offer).await?;
    info!(
        "{:<12} --> 제안 수락: offer={}, 최종가={}",
        "Offer", offer.id, offer.final_amount()
    );
    Ok(offer)
}

/// 거절: pending 상태에서 판매자만
pub async fn decline_offer(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offer_id: i64,
    req: OfferActionRequest,
) -> Result<Offer> {
    let mut offer = load_offer(store, clock, offer_id).await?;
    if offer.status != OfferStatus::Pending {
        return Err(invalid(&offer, "거절"));
    }
    if req.actor_id != offer.seller_id {
        return Err(EngineError::Forbidden);
    }
    offer.status = OfferStatus::Declined;
    store.update_offer(&offer).await?;
    info!("{:<12} --> 제안 거절: offer={}", "Offer", offer.id);
    Ok(offer)
}

/// 역제안: pending 상태에서 판매자만, 1회 한정
pub async fn counter_offer(
    store: &dyn LedgerStore,
    bus: &EventBus,
    clock: &dyn Clock,
    offer_id: i64,
    req: CounterOfferRequest,
) -> Result<Offer> {
    if !amount_in_range(req.counter_amount) {
        return Err(EngineError::InvalidAmount);
    }
    let mut offer = load_offer(store, clock, offer_id).await?;
    if offer.status != OfferStatus::Pending {
        return Err(invalid(&offer, "역제안"));
    }
    if req.seller_id != offer.seller_id {
        return Err(EngineError::Forbidden);
    }
    offer.status = OfferStatus::Countered;
    offer.counter_amount = Some(req.counter_amount);
    store.update_offer(&offer).await?;

    bus.publish(DomainEvent::OfferCountered {
        offer_id: offer.id,
        buyer_id: offer.buyer_id,
        counter_amount: req.counter_amount,
        timestamp: clock.now(),
    });
    info!(
        "{:<12} --> 역제안: offer={}, 금액={}",
        "Offer", offer.id, req.counter_amount
    );
    Ok(offer)
}

/// 철회: pending/countered 상태에서 구매자만
pub async fn withdraw_offer(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offer_id: i64,
    req: OfferActionRequest,
) -> Result<Offer> {
    let mut offer = load_offer(store, clock, offer_id).await?;
    if !matches!(offer.status, OfferStatus::Pending | OfferStatus::Countered) {
        return Err(invalid(&offer, "철회"));
    }
    if req.actor_id != offer.buyer_id {
        return Err(EngineError::Forbidden);
    }
    offer.status = OfferStatus::Withdrawn;
    store.update_offer(&offer).await?;
    info!("{:<12} --> 제안 철회: offer={}", "Offer", offer.id);
    Ok(offer)
}

/// 가격 오버라이드 소비 (체크아웃 경계)
/// 수락된 제안의 최종가를 정확히 한 번만 돌려주고 무효화한다.
pub async fn redeem_override(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offer_id: i64,
    req: OfferActionRequest,
) -> Result<(Offer, i64)> {
    let mut offer = load_offer(store, clock, offer_id).await?;
    if offer.status != OfferStatus::Accepted {
        return Err(invalid(&offer, "오버라이드 소비"));
    }
    if req.actor_id != offer.buyer_id {
        return Err(EngineError::Forbidden);
    }
    if offer.override_used {
        return Err(EngineError::OverrideAlreadyUsed);
    }
    offer.override_used = true;
    store.update_offer(&offer).await?;
    let amount = offer.final_amount();
    info!(
        "{:<12} --> 오버라이드 소비: offer={}, 금액={}",
        "Offer", offer.id, amount
    );
    Ok((offer, amount))
}

/// 스윕 경로: 만료 대상 제안 하나를 expired 로 전이 (멱등)
pub async fn sweep_offer(
    store: &dyn LedgerStore,
    clock: &dyn Clock,
    offer_id: i64,
) -> Result<bool> {
    let mut offer = store.offer(offer_id).await?;
    enforce_expiry(store, clock, &mut offer).await
}

// endregion: --- Offer Commands
