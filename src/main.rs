// region:    --- Imports
use bidding_engine::clock::SystemClock;
use bidding_engine::facade::TransactionFacade;
use bidding_engine::handlers;
use bidding_engine::increment::IncrementTable;
use bidding_engine::ledger::{LedgerStore, MemoryLedger, PgLedger};
use bidding_engine::notifier::EventBus;
use bidding_engine::scheduler::EngineScheduler;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 원장 선택: DATABASE_URL 이 있으면 Postgres, 없으면 인메모리
    let store: Arc<dyn LedgerStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let ledger = PgLedger::connect(&url).await?;
            if let Err(e) = ledger.initialize_schema().await {
                error!("{:<12} --> 스키마 초기화 실패: {:?}", "Main", e);
                return Err(e.into());
            }
            info!("{:<12} --> Postgres 원장 초기화 성공", "Main");
            Arc::new(ledger)
        }
        Err(_) => {
            info!("{:<12} --> DATABASE_URL 없음, 인메모리 원장 사용", "Main");
            Arc::new(MemoryLedger::new())
        }
    };

    // 도메인 이벤트 버스 (알림 전달은 구독자 몫)
    let bus = EventBus::default();
    let mut notifications = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            info!("{:<12} --> 도메인 이벤트: {:?}", "Notifier", event);
        }
    });

    let facade = TransactionFacade::new(
        store,
        bus,
        Arc::new(SystemClock),
        IncrementTable::default(),
    );

    // 마감/만료 주기 작업
    EngineScheduler::new(facade.clone()).start();

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let routes_all = handlers::router(facade).layer(cors);

    // 리스너 생성(로컬 호스트의 3000번 포트를 사용)
    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
