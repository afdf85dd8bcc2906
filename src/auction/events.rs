/// 알림 계층이 구독하는 도메인 이벤트
/// 전달/재시도 책임은 알림 서비스에 있고, 엔진은 발행만 한다.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum DomainEvent {
    // 선두를 빼앗긴 입찰자에게
    BidOutbid {
        lot_id: i64,
        bidder_id: i64,
        current_price: i64,
        timestamp: DateTime<Utc>,
    },
    // 낙찰자에게
    AuctionWon {
        lot_id: i64,
        winner_id: i64,
        price: i64,
        timestamp: DateTime<Utc>,
    },
    // 판매자에게 새 가격 제안
    OfferReceived {
        offer_id: i64,
        listing_id: i64,
        seller_id: i64,
        amount: i64,
        timestamp: DateTime<Utc>,
    },
    // 구매자에게 역제안
    OfferCountered {
        offer_id: i64,
        buyer_id: i64,
        counter_amount: i64,
        timestamp: DateTime<Utc>,
    },
    // 철회 요청자에게 심사 결과
    RetractionDecided {
        request_id: i64,
        bid_id: i64,
        approved: bool,
        timestamp: DateTime<Utc>,
    },
}
