//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        OpenAiModelAdapter, OpenAiSttAdapter, OpenAiTtsAdapter, SqliteStore,
        UnavailableSttAdapter, UnavailableTtsAdapter, UnconfiguredModelAdapter, Utf8TextExtractor,
    },
    config::Config,
    error::ApiError,
    web::{
        create_session_handler, delete_session_handler, list_artifacts_handler,
        list_sessions_handler, list_turns_handler, rename_session_handler, rest::ApiDoc,
        state::AppState, upload_document_handler, ws_handler,
    },
};
use async_openai::{
    config::OpenAIConfig,
    types::audio::{SpeechModel, Voice},
    Client,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use cognify_core::{
    engine::ConversationEngine,
    indexer::DocumentIndexer,
    ports::{ModelService, SpeechToTextService, TextToSpeechService},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Session Store ---
    info!("Opening session store at {:?}...", config.database_path);
    let store = Arc::new(SqliteStore::new(&config.database_path).await?);

    // --- 3. Initialize Service Adapters ---
    // Without an API key the speech and model capabilities degrade to their
    // "unavailable" stand-ins; sessions and quick-reply text still work.
    let (model, index_model, stt, tts): (
        Arc<dyn ModelService>,
        Arc<dyn ModelService>,
        Arc<dyn SpeechToTextService>,
        Arc<dyn TextToSpeechService>,
    ) = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let openai_client = Client::with_config(openai_config);

            let tts_voice = match config.tts_voice.to_lowercase().as_str() {
                "alloy" => Voice::Alloy,
                "echo" => Voice::Echo,
                "fable" => Voice::Fable,
                "onyx" => Voice::Onyx,
                "nova" => Voice::Nova,
                "shimmer" => Voice::Shimmer,
                _ => {
                    return Err(ApiError::Internal(format!(
                        "Invalid TTS voice specified in config: '{}'",
                        config.tts_voice
                    )))
                }
            };

            (
                Arc::new(OpenAiModelAdapter::new(
                    openai_client.clone(),
                    config.chat_model.clone(),
                )) as Arc<dyn ModelService>,
                Arc::new(OpenAiModelAdapter::new(
                    openai_client.clone(),
                    config.index_model.clone(),
                )) as Arc<dyn ModelService>,
                Arc::new(OpenAiSttAdapter::new(
                    openai_client.clone(),
                    config.stt_model.clone(),
                )) as Arc<dyn SpeechToTextService>,
                Arc::new(OpenAiTtsAdapter::new(
                    openai_client,
                    SpeechModel::Tts1Hd,
                    tts_voice,
                )) as Arc<dyn TextToSpeechService>,
            )
        }
        None => {
            warn!("OPENAI_API_KEY is not set; speech and model capabilities are unavailable.");
            (
                Arc::new(UnconfiguredModelAdapter) as Arc<dyn ModelService>,
                Arc::new(UnconfiguredModelAdapter) as Arc<dyn ModelService>,
                Arc::new(UnavailableSttAdapter) as Arc<dyn SpeechToTextService>,
                Arc::new(UnavailableTtsAdapter) as Arc<dyn TextToSpeechService>,
            )
        }
    };

    // --- 4. Build the Shared AppState ---
    let engine = Arc::new(ConversationEngine::new(store.clone(), model));
    let indexer = Arc::new(DocumentIndexer::new(index_model));
    let app_state = Arc::new(AppState {
        store,
        engine,
        indexer,
        extractor: Arc::new(Utf8TextExtractor),
        stt,
        tts,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route(
            "/sessions",
            post(create_session_handler).get(list_sessions_handler),
        )
        .route("/sessions/{id}", delete(delete_session_handler))
        .route("/sessions/{id}/title", put(rename_session_handler))
        .route("/sessions/{id}/turns", get(list_turns_handler))
        .route("/sessions/{id}/artifacts", get(list_artifacts_handler))
        .route("/sessions/{id}/documents", post(upload_document_handler))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
