use std::sync::Arc;

use tower_http::cors::CorsLayer;

use langwise::auth::AuthService;
use langwise::config::{AgoraConfig, AnalysisConfig, RealtimeConfig};
use langwise::gateway::{AgoraGateway, HmacTokenIssuer, TokenIssuer, VoiceAgentGateway};
use langwise::http::{AppState, api_routes};
use langwise::plan::create_generator;
use langwise::session::SessionCoordinator;
use langwise::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port: u16 = std::env::var("LANGWISE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let agora_config = AgoraConfig::from_env();
    if let Err(e) = agora_config.validate() {
        eprintln!("Warning: {e}");
    }
    let realtime_config = RealtimeConfig::from_env();
    let analysis_config = AnalysisConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("🎙 LangWise v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{port}/api");
    eprintln!(
        "   Analysis: {} (model: {})",
        analysis_config.backend, analysis_config.model
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("LANGWISE_DB_PATH").unwrap_or_else(|_| "./data/langwise.db".to_string());

    let db_path_ref = std::path::Path::new(&db_path);
    let store: Arc<dyn Store> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Collaborators ────────────────────────────────────────────────────
    let token_issuer: Arc<dyn TokenIssuer> = Arc::new(HmacTokenIssuer::new(
        agora_config.app_id.clone(),
        agora_config.app_certificate.clone(),
    ));
    let webhook_secret = agora_config.webhook_secret.clone();
    let gateway: Arc<dyn VoiceAgentGateway> =
        Arc::new(AgoraGateway::new(agora_config, realtime_config));
    let planner = create_generator(&analysis_config)?;

    // ── Coordinator + auth ───────────────────────────────────────────────
    let coordinator = Arc::new(SessionCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        planner,
    ));
    let auth = Arc::new(AuthService::new(Arc::clone(&store)));

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState {
        coordinator,
        store,
        gateway,
        auth,
        token_issuer,
        webhook_secret,
    };
    let app = api_routes(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "LangWise API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
