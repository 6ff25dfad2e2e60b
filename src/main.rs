use clap::Parser;
use scriptgate::client::http::LinkGatewayClient;
use scriptgate::config::Settings;
use scriptgate::http::{build_router, AppState};
use scriptgate::store::file::FileStore;
use scriptgate::store::memory::MemoryStore;
use scriptgate::store::{KeyRecordStore, ResourceStore};
use scriptgate::AccessGate;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

fn init_tracing(json_logs: bool) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scriptgate=info"))
    };
    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter()).init();
    }
}

type Stores = (Arc<dyn ResourceStore>, Arc<dyn KeyRecordStore>);

fn open_stores(settings: &Settings) -> Result<Stores, scriptgate::GateError> {
    if settings.in_memory {
        tracing::warn!("in-memory store: resources and keys are lost on restart");
        let store = Arc::new(MemoryStore::new());
        let resources: Arc<dyn ResourceStore> = store.clone();
        let key_records: Arc<dyn KeyRecordStore> = store;
        return Ok((resources, key_records));
    }

    let store = match &settings.data_dir {
        Some(dir) => FileStore::with_path(dir)?,
        None => FileStore::with_namespace("scriptgate")?,
    };
    let store = Arc::new(store);
    let resources: Arc<dyn ResourceStore> = store.clone();
    let key_records: Arc<dyn KeyRecordStore> = store;
    Ok((resources, key_records))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::parse();
    init_tracing(settings.json_logs);

    tracing::info!("scriptgate v{} starting", env!("CARGO_PKG_VERSION"));

    let config = settings.gate_config()?;
    let gateway_config = settings.gateway_config()?;

    let (resources, key_records) = open_stores(&settings)?;
    let mut gate = AccessGate::new(config, resources, key_records)?;

    // The blocking reqwest client must be built and dropped outside the runtime.
    match gateway_config {
        Some(gateway_config) => {
            let client =
                LinkGatewayClient::new(gateway_config, &gate.config().public_base_url)?;
            gate = gate.with_gateway(Arc::new(client));
            tracing::info!("monetization gateway enabled");
        }
        None => tracing::warn!("gateway disabled, keys are issued without completion checks"),
    }
    let gate = Arc::new(gate);

    tracing::info!(
        public_base_url = %gate.config().public_base_url,
        ticket_ttl_secs = gate.config().ticket_ttl.as_secs(),
        redemption_policy = ?gate.config().redemption_policy,
        "gate configured"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(&settings, gate.clone()))?;
    drop(runtime);

    tracing::info!("scriptgate stopped");
    Ok(())
}

async fn serve(settings: &Settings, gate: Arc<AccessGate>) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(AppState::new(gate));

    let addr = format!("{}:{}", settings.bind_address, settings.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    })
    .await?;
    Ok(())
}
