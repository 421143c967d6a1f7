use actix_cors::Cors;
use actix_web::{
    get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use actix_ws::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;
use wirecore::{fields_from_json, CredentialError, FailureKind, FlowGraph, StepFailure};
use wireruntime::{CredentialResolver, EncryptedCredentialStore, Runtime, RuntimeConfig};

/// Application state shared across handlers
struct AppState {
    runtime: Arc<Runtime>,
    credentials: Arc<RwLock<EncryptedCredentialStore>>,
    api_token: String,
}

/// Resolver facade over the shared encrypted store, handed to the
/// runtime so steps and handlers read the same material.
struct SharedStore(Arc<RwLock<EncryptedCredentialStore>>);

#[async_trait]
impl CredentialResolver for SharedStore {
    async fn fetch(
        &self,
        integration_id: &str,
    ) -> Result<HashMap<String, String>, CredentialError> {
        self.0.read().await.fetch(integration_id).await
    }
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default)]
    trigger: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetWebhookRequest {
    integration_id: Option<String>,
    webhook_url: Option<String>,
}

// No Debug derive: the map holds secret values.
#[derive(Deserialize)]
struct StoreCredentialsRequest {
    fields: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse {
        error: "Unauthorized".to_string(),
    })
}

/// Bearer-token check for routes that touch credentials.
fn authorized(req: &HttpRequest, state: &AppState) -> bool {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| !state.api_token.is_empty() && token == state.api_token)
        .unwrap_or(false)
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "wireflow"
    }))
}

/// Integration catalog for authoring collaborators
#[get("/api/plugins")]
async fn list_plugins(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.plugins().all()))
}

/// Flattened action catalog
#[get("/api/actions")]
async fn list_actions(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.actions().all()))
}

/// Create (register) a graph
#[post("/api/graphs")]
async fn create_graph(
    data: web::Data<AppState>,
    graph: web::Json<FlowGraph>,
) -> ActixResult<impl Responder> {
    let graph = graph.into_inner();
    info!("registering graph: {} ({})", graph.name, graph.id);

    match data.runtime.register_graph(graph).await {
        Ok(id) => Ok(HttpResponse::Created().json(serde_json::json!({ "id": id }))),
        Err(e) => Ok(HttpResponse::UnprocessableEntity().json(ErrorResponse {
            error: e.to_string(),
        })),
    }
}

/// List registered graphs
#[get("/api/graphs")]
async fn list_graphs(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let graphs = data.runtime.list_graphs().await;
    let summaries: Vec<_> = graphs
        .iter()
        .map(|g| {
            serde_json::json!({
                "id": g.id,
                "name": g.name,
                "description": g.description,
                "nodes": g.nodes.len(),
                "edges": g.edges.len(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

/// Get a registered graph
#[get("/api/graphs/{id}")]
async fn get_graph(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    match data.runtime.graph(path.into_inner()).await {
        Some(graph) => Ok(HttpResponse::Ok().json(graph)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: "Graph not found".to_string(),
        })),
    }
}

/// Delete a registered graph
#[actix_web::delete("/api/graphs/{id}")]
async fn delete_graph(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    if data.runtime.remove_graph(path.into_inner()).await {
        Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
    } else {
        Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: "Graph not found".to_string(),
        }))
    }
}

/// Execute a registered graph with an explicit trigger payload
#[post("/api/graphs/{id}/run")]
async fn run_graph(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<RunRequest>,
) -> ActixResult<impl Responder> {
    let graph_id = path.into_inner();
    let trigger = fields_from_json(req.into_inner().trigger);

    match data.runtime.run_registered(graph_id, trigger).await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(e) => {
            error!("run of {} failed: {}", graph_id, e);
            Ok(HttpResponse::UnprocessableEntity().json(ErrorResponse {
                error: e.to_string(),
            }))
        }
    }
}

/// Webhook ingress: map a Telegram update to trigger data and run the
/// graph it is wired to.
#[post("/api/hooks/{id}")]
async fn webhook_ingress(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    update: web::Json<serde_json::Value>,
) -> ActixResult<impl Responder> {
    let graph_id = path.into_inner();
    let trigger = wireplugins::telegram::trigger_fields_from_update(&update.into_inner());

    match data.runtime.run_registered(graph_id, trigger).await {
        Ok(report) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": report.success,
            "runId": report.run_id,
        }))),
        Err(e) => {
            warn!("webhook run of {} failed: {}", graph_id, e);
            Ok(HttpResponse::UnprocessableEntity().json(ErrorResponse {
                error: e.to_string(),
            }))
        }
    }
}

/// List configured integration instances (ids only, no secrets)
#[get("/api/integrations")]
async fn list_integrations(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> ActixResult<impl Responder> {
    if !authorized(&req, &data) {
        return Ok(unauthorized());
    }

    let store = data.credentials.read().await;
    let ids: Vec<String> = store.list().iter().map(|s| s.to_string()).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "integrations": ids })))
}

/// Store credential fields for an integration instance
#[post("/api/integrations/{id}/credentials")]
async fn store_credentials(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StoreCredentialsRequest>,
) -> ActixResult<impl Responder> {
    if !authorized(&req, &data) {
        return Ok(unauthorized());
    }

    let integration_id = path.into_inner();
    let mut store = data.credentials.write().await;
    match store.store(&integration_id, &body.fields).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true }))),
        Err(e) => Ok(HttpResponse::InternalServerError().json(ErrorResponse {
            error: e.to_string(),
        })),
    }
}

/// Run an integration's connectivity test against stored credentials
#[post("/api/integrations/{integration_type}/{id}/test")]
async fn test_integration(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ActixResult<impl Responder> {
    if !authorized(&req, &data) {
        return Ok(unauthorized());
    }

    let (integration_type, integration_id) = path.into_inner();
    let test = match data.runtime.plugins().connectivity_test(&integration_type) {
        Some(test) => test,
        None => {
            return Ok(HttpResponse::NotFound().json(ErrorResponse {
                error: format!("No connectivity test for '{}'", integration_type),
            }))
        }
    };

    let credentials = match data.runtime.credentials().fetch(&integration_id).await {
        Ok(credentials) => credentials,
        Err(CredentialError::NotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(ErrorResponse {
                error: "Integration not found".to_string(),
            }))
        }
        Err(e) => {
            return Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: e.to_string(),
            }))
        }
    };

    let result = test.test(&credentials).await;
    Ok(HttpResponse::Ok().json(result.to_json()))
}

/// Webhook registration boundary: resolve the integration's bot token
/// and register the callback URL with the provider.
#[post("/api/integrations/telegram/set-webhook")]
async fn set_telegram_webhook(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<SetWebhookRequest>,
) -> ActixResult<impl Responder> {
    if !authorized(&req, &data) {
        return Ok(unauthorized());
    }

    let body = body.into_inner();
    let (integration_id, webhook_url) = match (body.integration_id, body.webhook_url) {
        (Some(id), Some(url)) if !id.is_empty() && !url.is_empty() => (id, url),
        _ => {
            return Ok(HttpResponse::BadRequest().json(ErrorResponse {
                error: "Missing integrationId or webhookUrl".to_string(),
            }))
        }
    };

    // Decryption happens server-side only; the token never reaches the
    // authoring layer.
    let credentials = match data.runtime.credentials().fetch(&integration_id).await {
        Ok(credentials) => credentials,
        Err(CredentialError::NotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(ErrorResponse {
                error: "Integration not found".to_string(),
            }))
        }
        Err(e) => {
            error!("credential fetch failed: {}", e);
            return Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Internal server error".to_string(),
            }))
        }
    };

    match wireplugins::telegram::register_webhook(&credentials, &webhook_url).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true }))),
        Err(failure) => Ok(webhook_failure_response(failure)),
    }
}

fn webhook_failure_response(failure: StepFailure) -> HttpResponse {
    let body = ErrorResponse {
        error: failure.message.clone(),
    };
    match failure.kind {
        FailureKind::Validation | FailureKind::ExternalApi => HttpResponse::BadRequest().json(body),
        FailureKind::Network => HttpResponse::BadGateway().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// WebSocket endpoint for real-time run events
#[get("/api/events")]
async fn websocket_events(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("starting wireflow server");

    let api_token = std::env::var("WIREFLOW_API_TOKEN").unwrap_or_default();
    if api_token.is_empty() {
        warn!("WIREFLOW_API_TOKEN is not set; credential routes will reject all requests");
    }

    let store_path = std::env::var("WIREFLOW_CREDENTIALS_FILE")
        .unwrap_or_else(|_| "wireflow-credentials.json".to_string());
    let passphrase = std::env::var("WIREFLOW_CREDENTIALS_KEY")
        .map_err(|_| anyhow::anyhow!("WIREFLOW_CREDENTIALS_KEY must be set"))?;

    let store = Arc::new(RwLock::new(
        EncryptedCredentialStore::load(&store_path, &passphrase)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open credential store: {}", e))?,
    ));

    let runtime = Runtime::new(
        wireplugins::builtin_plugins(),
        Arc::new(SharedStore(store.clone())),
        RuntimeConfig::default(),
    )?;

    info!("runtime initialized with built-in plugins");

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
        credentials: store,
        api_token,
    });

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    info!("server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_plugins)
            .service(list_actions)
            .service(create_graph)
            .service(list_graphs)
            .service(get_graph)
            .service(delete_graph)
            .service(run_graph)
            .service(webhook_ingress)
            .service(list_integrations)
            .service(store_credentials)
            .service(test_integration)
            .service(set_telegram_webhook)
            .service(websocket_events)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
