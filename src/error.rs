/// 엔진 오류 분류
/// 1. 검증 오류: 요청 자체가 잘못됨. 어떤 상태도 기록되지 않는다.
/// 2. 상태 오류: 현재 상태에서 허용되지 않는 전이. 응답에 권위 있는 현재 상태를 함께 싣는다.
/// 3. 동시성 타임아웃: 락 획득 실패. 부분 적용 없이 거절되므로 재시도 가능.
/// 4. 조회 실패: 알 수 없는 ID.
// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

// endregion: --- Imports

pub type Result<T> = std::result::Result<T, EngineError>;

// region:    --- EngineError

#[derive(Debug, Error)]
pub enum EngineError {
    // -- 검증 오류
    #[error("입찰 금액이 최소 입찰가보다 낮습니다. (최소 입찰가: {minimum})")]
    BidBelowMinimum { minimum: i64 },

    #[error("최대 입찰가는 기존 금액({current})보다 높여야만 합니다.")]
    MustIncrease { current: i64 },

    #[error("금액은 0보다 크고 허용 상한 이하인 정수(센트)여야 합니다.")]
    InvalidAmount,

    #[error("판매자는 자신의 경매에 입찰할 수 없습니다.")]
    SelfBid,

    // -- 상태 오류
    #[error("경매가 이미 종료되었습니다. (현재 상태: {status})")]
    AuctionClosed { status: String },

    #[error("즉시 구매가 불가능한 상품입니다.")]
    BuyNowUnavailable,

    #[error("현재 상태({from})에서 허용되지 않는 작업({action})입니다.")]
    InvalidTransition { from: String, action: String },

    #[error("해당 작업을 수행할 권한이 없는 사용자입니다.")]
    Forbidden,

    #[error("재고가 부족합니다. (예약 가능 수량: {available})")]
    InsufficientStock { available: i64 },

    #[error("보류 상태가 아닌 예약입니다. (현재 상태: {status})")]
    ReservationNotHeld { status: String },

    #[error("가격 오버라이드가 이미 사용되었습니다.")]
    OverrideAlreadyUsed,

    #[error("이미 심사가 끝난 철회 요청입니다. (현재 상태: {status})")]
    AlreadyDecided { status: String },

    // -- 동시성 타임아웃
    #[error("다른 요청 처리 중입니다. 잠시 후 다시 시도해 주세요.")]
    Busy,

    // -- 조회 실패
    #[error("{kind}(id: {id})을(를) 찾을 수 없습니다.")]
    NotFound { kind: &'static str, id: i64 },

    // -- 저장소 오류
    #[error("저장소 오류: {0}")]
    Store(String),
}

impl EngineError {
    /// 클라이언트가 분기 처리할 수 있는 고정 코드
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::BidBelowMinimum { .. } => "LOW_BID",
            EngineError::MustIncrease { .. } => "MUST_INCREASE",
            EngineError::InvalidAmount => "INVALID_AMOUNT",
            EngineError::SelfBid => "SELF_BID",
            EngineError::AuctionClosed { .. } => "ALREADY_ENDED",
            EngineError::BuyNowUnavailable => "BUY_NOW_UNAVAILABLE",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::Forbidden => "FORBIDDEN",
            EngineError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            EngineError::ReservationNotHeld { .. } => "NOT_HELD",
            EngineError::OverrideAlreadyUsed => "OVERRIDE_USED",
            EngineError::AlreadyDecided { .. } => "ALREADY_DECIDED",
            EngineError::Busy => "BUSY",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Store(_) => "STORE_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::BidBelowMinimum { .. }
            | EngineError::MustIncrease { .. }
            | EngineError::InvalidAmount
            | EngineError::SelfBid => StatusCode::BAD_REQUEST,
            EngineError::AuctionClosed { .. }
            | EngineError::BuyNowUnavailable
            | EngineError::InvalidTransition { .. }
            | EngineError::InsufficientStock { .. }
            | EngineError::ReservationNotHeld { .. }
            | EngineError::OverrideAlreadyUsed
            | EngineError::AlreadyDecided { .. } => StatusCode::CONFLICT,
            EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}

/// 오류 응답: {"error": 메시지, "code": 고정 코드, ...부가 필드}
/// 상태 오류는 호출자가 화면을 재동기화할 수 있도록 현재 상태를 함께 내려준다.
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        match &self {
            EngineError::BidBelowMinimum { minimum } => {
                body["minimum_next_bid"] = serde_json::json!(minimum);
            }
            EngineError::MustIncrease { current } => {
                body["current_max"] = serde_json::json!(current);
            }
            EngineError::AuctionClosed { status }
            | EngineError::ReservationNotHeld { status }
            | EngineError::AlreadyDecided { status } => {
                body["status"] = serde_json::json!(status);
            }
            EngineError::InvalidTransition { from, .. } => {
                body["status"] = serde_json::json!(from);
            }
            EngineError::InsufficientStock { available } => {
                body["available"] = serde_json::json!(available);
            }
            _ => {}
        }
        (self.status_code(), Json(body)).into_response()
    }
}

// endregion: --- EngineError
