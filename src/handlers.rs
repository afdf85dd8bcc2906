/// HTTP 핸들러
/// 파사드 앞의 얇은 껍데기다. 요청 본문을 태그된 요청 타입으로 검증해 넘기고,
/// 성공이면 권위 있는 현재 상태를, 실패면 구체적인 거절 사유를 돌려준다.
/// 조용한 no-op 응답은 없다 — 입찰자는 자신의 입찰이 반영됐는지 항상 알 수 있다.
// region:    --- Imports
use crate::bidding::commands::{
    BuyNowRequest, CancelLotRequest, CreateLotRequest, PlaceBidRequest, RetractRequest,
    RetractionDecision,
};
use crate::error::EngineError;
use crate::facade::TransactionFacade;
use crate::inventory::{CreateListingRequest, ReserveRequest};
use crate::offers::{CounterOfferRequest, MakeOfferRequest, OfferActionRequest};
use crate::query::mask_bidder;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

// endregion: --- Imports

// region:    --- Router

pub fn router(facade: TransactionFacade) -> Router {
    Router::new()
        // 경매
        .route("/lots", post(handle_create_lot))
        .route("/lots/:id", get(handle_get_lot))
        .route("/lots/:id/events", get(handle_get_lot_events))
        .route("/lots/:id/bids", post(handle_place_bid))
        .route("/lots/:id/buy-now", post(handle_buy_now))
        .route("/lots/:id/close", post(handle_close_lot))
        .route("/lots/:id/cancel", post(handle_cancel_lot))
        .route("/bids/:id/retraction", post(handle_request_retraction))
        .route("/retractions/:id/decision", post(handle_decide_retraction))
        // 제안
        .route("/offers", post(handle_make_offer))
        .route("/offers/:id", get(handle_get_offer))
        .route("/offers/:id/accept", post(handle_accept_offer))
        .route("/offers/:id/decline", post(handle_decline_offer))
        .route("/offers/:id/counter", post(handle_counter_offer))
        .route("/offers/:id/withdraw", post(handle_withdraw_offer))
        .route("/offers/:id/redeem", post(handle_redeem_offer))
        // 리스팅 / 재고
        .route("/listings", post(handle_create_listing))
        .route("/listings/:id", get(handle_get_listing))
        .route("/listings/:id/reservations", post(handle_reserve))
        .route("/reservations/:id/commit", post(handle_commit_reservation))
        .route("/reservations/:id/release", post(handle_release_reservation))
        .with_state(facade)
}

// endregion: --- Router

// region:    --- Auction Handlers

/// 로트 생성 (카탈로그 경계)
async fn handle_create_lot(
    State(facade): State<TransactionFacade>,
    Json(req): Json<CreateLotRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let lot = facade.create_lot(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "lot_id": lot.id, "status": lot.status })),
    ))
}

/// 위임 입찰
async fn handle_place_bid(
    State(facade): State<TransactionFacade>,
    Path(lot_id): Path<i64>,
    Json(req): Json<PlaceBidRequest>,
) -> Result<impl IntoResponse, EngineError> {
    info!("{:<12} --> 입찰 요청: lot={}", "Handler", lot_id);
    let (lot, bid) = facade.place_bid(lot_id, req).await?;
    Ok(Json(serde_json::json!({
        "message": "입찰이 수리되었습니다.",
        "lot_id": lot.id,
        "bid_id": bid.id,
        "bid_status": bid.status,
        "current_price": lot.current_price,
        "leader": lot.leader_id.map(mask_bidder),
    })))
}

/// 즉시 구매
async fn handle_buy_now(
    State(facade): State<TransactionFacade>,
    Path(lot_id): Path<i64>,
    Json(req): Json<BuyNowRequest>,
) -> Result<impl IntoResponse, EngineError> {
    info!("{:<12} --> 즉시 구매 요청: lot={}", "Handler", lot_id);
    let lot = facade.buy_now(lot_id, req).await?;
    Ok(Json(serde_json::json!({
        "message": "즉시 구매가 완료되었습니다.",
        "lot_id": lot.id,
        "status": lot.status,
        "final_price": lot.current_price,
    })))
}

/// 마감 (스케줄러/운영자, 멱등)
async fn handle_close_lot(
    State(facade): State<TransactionFacade>,
    Path(lot_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let lot = facade.close_lot(lot_id).await?;
    Ok(Json(serde_json::json!({
        "lot_id": lot.id,
        "status": lot.status,
        "final_price": lot.current_price,
        "winner_id": lot.leader_id,
    })))
}

/// 취소 (판매자)
async fn handle_cancel_lot(
    State(facade): State<TransactionFacade>,
    Path(lot_id): Path<i64>,
    Json(req): Json<CancelLotRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let lot = facade.cancel_lot(lot_id, req).await?;
    Ok(Json(serde_json::json!({ "lot_id": lot.id, "status": lot.status })))
}

/// 로트 공개 뷰
async fn handle_get_lot(
    State(facade): State<TransactionFacade>,
    Path(lot_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    Ok(Json(facade.lot_view(lot_id).await?))
}

/// 호가 이력
async fn handle_get_lot_events(
    State(facade): State<TransactionFacade>,
    Path(lot_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    Ok(Json(facade.lot_events(lot_id).await?))
}

/// 철회 요청
async fn handle_request_retraction(
    State(facade): State<TransactionFacade>,
    Path(bid_id): Path<i64>,
    Json(req): Json<RetractRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let request = facade.request_retraction(bid_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "request_id": request.id, "status": request.status })),
    ))
}

/// 철회 심사
async fn handle_decide_retraction(
    State(facade): State<TransactionFacade>,
    Path(request_id): Path<i64>,
    Json(decision): Json<RetractionDecision>,
) -> Result<impl IntoResponse, EngineError> {
    let request = facade.decide_retraction(request_id, decision).await?;
    Ok(Json(serde_json::json!({
        "request_id": request.id,
        "status": request.status,
        "lot_id": request.lot_id,
    })))
}

// endregion: --- Auction Handlers

// region:    --- Offer Handlers

async fn handle_make_offer(
    State(facade): State<TransactionFacade>,
    Json(req): Json<MakeOfferRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let offer = facade.make_offer(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "offer_id": offer.id,
            "status": offer.status,
            "expires_at": offer.expires_at,
        })),
    ))
}

async fn handle_get_offer(
    State(facade): State<TransactionFacade>,
    Path(offer_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    Ok(Json(facade.offer_view(offer_id).await?))
}

async fn handle_accept_offer(
    State(facade): State<TransactionFacade>,
    Path(offer_id): Path<i64>,
    Json(req): Json<OfferActionRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let offer = facade.accept_offer(offer_id, req).await?;
    Ok(Json(serde_json::json!({
        "offer_id": offer.id,
        "status": offer.status,
        "final_amount": offer.final_amount(),
    })))
}

async fn handle_decline_offer(
    State(facade): State<TransactionFacade>,
    Path(offer_id): Path<i64>,
    Json(req): Json<OfferActionRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let offer = facade.decline_offer(offer_id, req).await?;
    Ok(Json(serde_json::json!({ "offer_id": offer.id, "status": offer.status })))
}

async fn handle_counter_offer(
    State(facade): State<TransactionFacade>,
    Path(offer_id): Path<i64>,
    Json(req): Json<CounterOfferRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let offer = facade.counter_offer(offer_id, req).await?;
    Ok(Json(serde_json::json!({
        "offer_id": offer.id,
        "status": offer.status,
        "counter_amount": offer.counter_amount,
    })))
}

async fn handle_withdraw_offer(
    State(facade): State<TransactionFacade>,
    Path(offer_id): Path<i64>,
    Json(req): Json<OfferActionRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let offer = facade.withdraw_offer(offer_id, req).await?;
    Ok(Json(serde_json::json!({ "offer_id": offer.id, "status": offer.status })))
}

/// 체크아웃이 수락가 오버라이드를 소비한다 (1회 한정).
async fn handle_redeem_offer(
    State(facade): State<TransactionFacade>,
    Path(offer_id): Path<i64>,
    Json(req): Json<OfferActionRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let (offer, amount) = facade.redeem_offer_override(offer_id, req).await?;
    Ok(Json(serde_json::json!({
        "offer_id": offer.id,
        "final_amount": amount,
    })))
}

// endregion: --- Offer Handlers

// region:    --- Inventory Handlers

async fn handle_create_listing(
    State(facade): State<TransactionFacade>,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let listing = facade.create_listing(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "listing_id": listing.id })),
    ))
}

async fn handle_get_listing(
    State(facade): State<TransactionFacade>,
    Path(listing_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    Ok(Json(facade.listing_view(listing_id).await?))
}

async fn handle_reserve(
    State(facade): State<TransactionFacade>,
    Path(listing_id): Path<i64>,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = facade.reserve(listing_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "reservation_id": reservation.id,
            "status": reservation.status,
            "expires_at": reservation.expires_at,
        })),
    ))
}

async fn handle_commit_reservation(
    State(facade): State<TransactionFacade>,
    Path(reservation_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = facade.commit_reservation(reservation_id).await?;
    Ok(Json(serde_json::json!({
        "reservation_id": reservation.id,
        "status": reservation.status,
    })))
}

async fn handle_release_reservation(
    State(facade): State<TransactionFacade>,
    Path(reservation_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let reservation = facade.release_reservation(reservation_id).await?;
    Ok(Json(serde_json::json!({
        "reservation_id": reservation.id,
        "status": reservation.status,
    })))
}

// endregion: --- Inventory Handlers
