/// 원장에 기록되는 도메인 레코드
/// 금액은 전부 정수 센트(i64)로 다뤄 부동소수점 오차를 차단한다.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// endregion: --- Imports

// region:    --- Amount Bounds

/// 허용되는 최대 금액 (센트, $1,000,000,000.00)
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// 금액 입력이 허용 범위(1 ~ 상한)에 드는지
pub fn amount_in_range(amount: i64) -> bool {
    (1..=MAX_AMOUNT_CENTS).contains(&amount)
}

// endregion: --- Amount Bounds

// region:    --- Status Enums

/// 경매 로트 상태
/// 전이는 open → {closed, cancelled}, open → {sold, reserve-not-met} (마감 판정) 뿐이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LotStatus {
    Open,
    Closed,
    Sold,
    ReserveNotMet,
    Cancelled,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Open => "open",
            LotStatus::Closed => "closed",
            LotStatus::Sold => "sold",
            LotStatus::ReserveNotMet => "reserve-not-met",
            LotStatus::Cancelled => "cancelled",
        }
    }
}

/// 위임 입찰 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BidStatus {
    Active,
    Winning,
    Outbid,
    Retracted,
    Void,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Active => "active",
            BidStatus::Winning => "winning",
            BidStatus::Outbid => "outbid",
            BidStatus::Retracted => "retracted",
            BidStatus::Void => "void",
        }
    }

    /// 아직 유효하게 서 있는 입찰인지 (철회/무효 제외)
    pub fn is_standing(&self) -> bool {
        matches!(self, BidStatus::Active | BidStatus::Winning | BidStatus::Outbid)
    }
}

/// 철회 요청 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetractionStatus {
    Pending,
    Approved,
    Denied,
}

impl RetractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetractionStatus::Pending => "pending",
            RetractionStatus::Approved => "approved",
            RetractionStatus::Denied => "denied",
        }
    }
}

/// 가격 제안 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Countered,
    Withdrawn,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Countered => "countered",
            OfferStatus::Withdrawn => "withdrawn",
            OfferStatus::Expired => "expired",
        }
    }

    /// 종결 상태인지 (종결 이후 레코드는 불변)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStatus::Accepted
                | OfferStatus::Declined
                | OfferStatus::Withdrawn
                | OfferStatus::Expired
        )
    }
}

/// 재고 예약 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationStatus {
    Held,
    Committed,
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
        }
    }
}

macro_rules! impl_status_text {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = String;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    serde_json::from_value(serde_json::Value::String(s.to_string()))
                        .map_err(|_| format!("알 수 없는 상태 값: {}", s))
                }
            }
        )*
    };
}

impl_status_text!(LotStatus, BidStatus, RetractionStatus, OfferStatus, ReservationStatus);

// endregion: --- Status Enums

// region:    --- Auction Records

/// 경매 로트. 카탈로그 속성은 생성 시에만 받아들이고 이후에는 건드리지 않는다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub starting_price: i64,
    /// 최저 낙찰가(내정가). 입찰자에게 절대 노출되지 않는다.
    pub reserve_price: Option<i64>,
    pub buy_now_price: Option<i64>,
    pub close_time: DateTime<Utc>,
    pub status: LotStatus,
    /// 현재 공개 호가. open 상태에서는 단조 비감소.
    pub current_price: i64,
    pub leader_id: Option<i64>,
    pub bid_count: i64,
    pub created_at: DateTime<Utc>,
}

/// 위임 입찰: 입찰자의 비공개 최대 금액을 대신 집행하는 지시.
/// 한 입찰자는 로트당 유효 입찰 하나만 가지며, 금액은 인상만 가능하다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyBid {
    pub id: i64,
    pub lot_id: i64,
    pub bidder_id: i64,
    /// 비공개 최대 금액. 어떤 공개 프로젝션에도 싣지 않는다.
    pub max_amount: i64,
    pub placed_at: DateTime<Utc>,
    pub status: BidStatus,
}

/// 공개 호가 변동의 불변 기록. 로트별 seq 는 엄격 증가한다.
/// trigger_bid_id 가 None 이면 철회 승인/즉시구매 등에 따른 보정 이벤트다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidEvent {
    pub id: i64,
    pub lot_id: i64,
    pub seq: i64,
    pub price: i64,
    pub leader_id: Option<i64>,
    pub trigger_bid_id: Option<i64>,
    /// 이벤트 시점에 제출된 최대 금액. 철회 재연산 전용이며 외부 비공개.
    pub max_at_event: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

/// 입찰 철회 요청. 심사자가 승인하기 전까지 로트 상태를 건드리지 않는다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractionRequest {
    pub id: i64,
    pub bid_id: i64,
    pub lot_id: i64,
    pub reason_code: String,
    pub explanation: String,
    pub status: RetractionStatus,
    pub reviewer_note: Option<String>,
    pub requested_at: DateTime<Utc>,
}

// endregion: --- Auction Records

// region:    --- Listing Records

/// 고정가 리스팅 (수량 판매)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    /// 고정 판매가 (제안 수락 시 오버라이드됨)
    pub price: i64,
    pub available_quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// 가격 제안. 종결 상태에 들어가면 불변이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub amount: i64,
    /// countered 상태에서만 값이 있다.
    pub counter_amount: Option<i64>,
    pub message: Option<String>,
    pub status: OfferStatus,
    /// 수락가 오버라이드는 체크아웃에서 정확히 한 번만 소비된다.
    pub override_used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Offer {
    /// 체크아웃에 적용될 최종 금액 (역제안가가 있으면 그 값)
    pub fn final_amount(&self) -> i64 {
        self.counter_amount.unwrap_or(self.amount)
    }
}

/// 재고 예약: 수량 N에 대한 시한부 보류
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReservation {
    pub id: i64,
    pub listing_id: i64,
    pub quantity: i64,
    /// 세션 혹은 구매자 식별자
    pub holder: String,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl StockReservation {
    /// 아직 재고를 점유하고 있는 예약인지.
    /// 만료된 held 는 스윕 전이라도 가용 수량 계산에서 제외한다.
    pub fn occupies_stock(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReservationStatus::Committed => true,
            ReservationStatus::Held => now <= self.expires_at,
            ReservationStatus::Released => false,
        }
    }
}

// endregion: --- Listing Records
