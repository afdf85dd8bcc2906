/// 트랜잭션 파사드
/// 외부 협력자(체크아웃, 알림, UI 읽기 모델)가 쓰는 유일한 진입점.
///
/// 직렬화 단위는 로트/리스팅/제안 키별 논리 락 하나다. 같은 키에 대한 변경은
/// 절대 끼어들지 않고, 락 도착 순서가 곧 이벤트 순서가 된다 (클라이언트
/// 벽시계가 아니라). 락 획득은 짧은 타임아웃을 두고 실패 시 Busy 로 거절해
/// 마감 직전 경합에서 무한 대기를 막는다.
///
/// 읽기 전용 조회는 락 없이 마지막 커밋 상태를 본다.
// region:    --- Imports
use crate::bidding::commands::{
    self, BuyNowRequest, CancelLotRequest, CreateLotRequest, PlaceBidRequest, RetractRequest,
    RetractionDecision,
};
use crate::bidding::model::{Listing, Lot, Offer, ProxyBid, RetractionRequest, StockReservation};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::increment::IncrementTable;
use crate::inventory::{self, CreateListingRequest, ReserveRequest};
use crate::ledger::LedgerStore;
use crate::notifier::EventBus;
use crate::offers::{self, CounterOfferRequest, MakeOfferRequest, OfferActionRequest};
use crate::query::{self, BidEventView, ListingView, LotView, OfferView};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Keyed Locks

/// 직렬화 키: 로트/리스팅/제안 단위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Lot(i64),
    Listing(i64),
    Offer(i64),
}

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

// endregion: --- Keyed Locks

// region:    --- TransactionFacade

#[derive(Clone)]
pub struct TransactionFacade {
    store: Arc<dyn LedgerStore>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    table: Arc<IncrementTable>,
    locks: Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>,
    lock_timeout: Duration,
}

impl TransactionFacade {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        table: IncrementTable,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            table: Arc::new(table),
            locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn increment_table(&self) -> &IncrementTable {
        &self.table
    }

    /// 키 락 획득. 타임아웃이면 Busy — 부분 적용 없이 거절되므로 재시도 가능.
    async fn lock(&self, key: LockKey) -> Result<OwnedMutexGuard<()>> {
        let entry = {
            let mut locks = self.locks.lock().expect("락 맵 poisoned");
            Arc::clone(locks.entry(key).or_default())
        };
        match tokio::time::timeout(self.lock_timeout, entry.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!("{:<12} --> 락 획득 타임아웃: {:?}", "Facade", key);
                Err(EngineError::Busy)
            }
        }
    }

    // -- 경매 (로트 락)

    pub async fn create_lot(&self, req: CreateLotRequest) -> Result<Lot> {
        commands::create_lot(self.store.as_ref(), self.clock.as_ref(), req).await
    }

    pub async fn place_bid(&self, lot_id: i64, req: PlaceBidRequest) -> Result<(Lot, ProxyBid)> {
        let _guard = self.lock(LockKey::Lot(lot_id)).await?;
        commands::place_bid(
            self.store.as_ref(),
            &self.bus,
            self.clock.as_ref(),
            &self.table,
            lot_id,
            req,
        )
        .await
    }

    pub async fn buy_now(&self, lot_id: i64, req: BuyNowRequest) -> Result<Lot> {
        let _guard = self.lock(LockKey::Lot(lot_id)).await?;
        commands::buy_now(self.store.as_ref(), &self.bus, self.clock.as_ref(), lot_id, req).await
    }

    /// 멱등 마감. 스케줄러와 실시간 입찰이 같은 로트를 두고 경주해도
    /// 락에 먼저 도착한 쪽이 마지막 입찰의 유효성을 결정한다.
    pub async fn close_lot(&self, lot_id: i64) -> Result<Lot> {
        let _guard = self.lock(LockKey::Lot(lot_id)).await?;
        commands::close_lot(self.store.as_ref(), &self.bus, self.clock.as_ref(), lot_id).await
    }

    pub async fn cancel_lot(&self, lot_id: i64, req: CancelLotRequest) -> Result<Lot> {
        let _guard = self.lock(LockKey::Lot(lot_id)).await?;
        commands::cancel_lot(self.store.as_ref(), self.clock.as_ref(), lot_id, req).await
    }

    pub async fn request_retraction(
        &self,
        bid_id: i64,
        req: RetractRequest,
    ) -> Result<RetractionRequest> {
        let bid = self.store.bid(bid_id).await?;
        let _guard = self.lock(LockKey::Lot(bid.lot_id)).await?;
        commands::request_retraction(self.store.as_ref(), self.clock.as_ref(), bid_id, req).await
    }

    pub async fn decide_retraction(
        &self,
        request_id: i64,
        decision: RetractionDecision,
    ) -> Result<RetractionRequest> {
        let request = self.store.retraction(request_id).await?;
        let _guard = self.lock(LockKey::Lot(request.lot_id)).await?;
        commands::decide_retraction(
            self.store.as_ref(),
            &self.bus,
            self.clock.as_ref(),
            &self.table,
            request_id,
            decision,
        )
        .await
    }

    // -- 제안 (제안 락)

    pub async fn create_listing(&self, req: CreateListingRequest) -> Result<Listing> {
        inventory::create_listing(self.store.as_ref(), self.clock.as_ref(), req).await
    }

    pub async fn make_offer(&self, req: MakeOfferRequest) -> Result<Offer> {
        offers::make_offer(self.store.as_ref(), &self.bus, self.clock.as_ref(), req).await
    }

    pub async fn accept_offer(&self, offer_id: i64, req: OfferActionRequest) -> Result<Offer> {
        let _guard = self.lock(LockKey::Offer(offer_id)).await?;
        offers::accept_offer(self.store.as_ref(), self.clock.as_ref(), offer_id, req).await
    }

    pub async fn decline_offer(&self, offer_id: i64, req: OfferActionRequest) -> Result<Offer> {
        let _guard = self.lock(LockKey::Offer(offer_id)).await?;
        offers::decline_offer(self.store.as_ref(), self.clock.as_ref(), offer_id, req).await
    }

    pub async fn counter_offer(&self, offer_id: i64, req: CounterOfferRequest) -> Result<Offer> {
        let _guard = self.lock(LockKey::Offer(offer_id)).await?;
        offers::counter_offer(self.store.as_ref(), &self.bus, self.clock.as_ref(), offer_id, req)
            .await
    }

    pub async fn withdraw_offer(&self, offer_id: i64, req: OfferActionRequest) -> Result<Offer> {
        let _guard = self.lock(LockKey::Offer(offer_id)).await?;
        offers::withdraw_offer(self.store.as_ref(), self.clock.as_ref(), offer_id, req).await
    }

    /// 체크아웃 경계: 수락가 오버라이드를 정확히 한 번 소비한다.
    pub async fn redeem_offer_override(
        &self,
        offer_id: i64,
        req: OfferActionRequest,
    ) -> Result<(Offer, i64)> {
        let _guard = self.lock(LockKey::Offer(offer_id)).await?;
        offers::redeem_override(self.store.as_ref(), self.clock.as_ref(), offer_id, req).await
    }

    // -- 재고 (리스팅 락)

    pub async fn reserve(&self, listing_id: i64, req: ReserveRequest) -> Result<StockReservation> {
        let _guard = self.lock(LockKey::Listing(listing_id)).await?;
        inventory::reserve(self.store.as_ref(), self.clock.as_ref(), listing_id, req).await
    }

    pub async fn commit_reservation(&self, reservation_id: i64) -> Result<StockReservation> {
        let reservation = self.store.reservation(reservation_id).await?;
        let _guard = self.lock(LockKey::Listing(reservation.listing_id)).await?;
        inventory::commit(self.store.as_ref(), self.clock.as_ref(), reservation_id).await
    }

    pub async fn release_reservation(&self, reservation_id: i64) -> Result<StockReservation> {
        let reservation = self.store.reservation(reservation_id).await?;
        let _guard = self.lock(LockKey::Listing(reservation.listing_id)).await?;
        inventory::release(self.store.as_ref(), reservation_id).await
    }

    // -- 읽기 프로젝션 (락 없음)

    pub async fn lot_view(&self, lot_id: i64) -> Result<LotView> {
        let lot = self.store.lot(lot_id).await?;
        Ok(query::project_lot(&lot, &self.table))
    }

    pub async fn lot_events(&self, lot_id: i64) -> Result<Vec<BidEventView>> {
        // 존재 확인 겸 조회
        self.store.lot(lot_id).await?;
        let events = self.store.bid_events(lot_id).await?;
        Ok(query::project_events(&events))
    }

    /// 제안 조회는 게으른 만료 집행 때문에 제안 락을 잡는다.
    pub async fn offer_view(&self, offer_id: i64) -> Result<OfferView> {
        let _guard = self.lock(LockKey::Offer(offer_id)).await?;
        let offer = offers::load_offer(self.store.as_ref(), self.clock.as_ref(), offer_id).await?;
        Ok(query::project_offer(&offer))
    }

    pub async fn listing_view(&self, listing_id: i64) -> Result<ListingView> {
        let listing = self.store.listing(listing_id).await?;
        let reservations = self.store.reservations_for_listing(listing_id).await?;
        Ok(query::project_listing(
            &listing,
            &reservations,
            self.clock.now(),
        ))
    }

    // -- 스케줄러 훅

    /// 마감 시각이 지난 로트를 전부 마감한다. 처리 건수를 돌려준다.
    pub async fn close_due_lots(&self) -> usize {
        let due = match self.store.lots_due(self.clock.now()).await {
            Ok(due) => due,
            Err(e) => {
                error!("{:<12} --> 마감 대상 조회 실패: {:?}", "Facade", e);
                return 0;
            }
        };
        let mut closed = 0;
        for lot_id in due {
            match self.close_lot(lot_id).await {
                Ok(_) => closed += 1,
                Err(e) => error!("{:<12} --> 로트 마감 실패: id={}, {:?}", "Facade", lot_id, e),
            }
        }
        if closed > 0 {
            info!("{:<12} --> 마감 처리 완료: {}건", "Facade", closed);
        }
        closed
    }

    /// 만료된 제안을 expired 로 전이한다 (게으른 집행의 보조 스윕).
    pub async fn sweep_offers(&self) -> usize {
        let due = match self.store.offers_due(self.clock.now()).await {
            Ok(due) => due,
            Err(e) => {
                error!("{:<12} --> 만료 제안 조회 실패: {:?}", "Facade", e);
                return 0;
            }
        };
        let mut swept = 0;
        for offer_id in due {
            let swept_one = async {
                let _guard = self.lock(LockKey::Offer(offer_id)).await?;
                offers::sweep_offer(self.store.as_ref(), self.clock.as_ref(), offer_id).await
            }
            .await;
            match swept_one {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(e) => error!(
                    "{:<12} --> 제안 만료 처리 실패: id={}, {:?}",
                    "Facade", offer_id, e
                ),
            }
        }
        swept
    }

    /// 만료된 held 예약을 풀어 재고를 되돌린다.
    pub async fn sweep_reservations(&self) -> usize {
        let due = match self.store.reservations_due(self.clock.now()).await {
            Ok(due) => due,
            Err(e) => {
                error!("{:<12} --> 만료 예약 조회 실패: {:?}", "Facade", e);
                return 0;
            }
        };
        let mut swept = 0;
        for reservation_id in due {
            let swept_one = async {
                let reservation = self.store.reservation(reservation_id).await?;
                let _guard = self.lock(LockKey::Listing(reservation.listing_id)).await?;
                inventory::sweep_reservation(self.store.as_ref(), self.clock.as_ref(), reservation_id)
                    .await
            }
            .await;
            match swept_one {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(e) => error!(
                    "{:<12} --> 예약 만료 처리 실패: id={}, {:?}",
                    "Facade", reservation_id, e
                ),
            }
        }
        swept
    }
}

// endregion: --- TransactionFacade
