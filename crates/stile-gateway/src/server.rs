//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints:
//! - `GET /v1/models`
//! - `POST /v1/chat/completions`
//! - `GET /health`
//!
//! Request order is deliberate: bearer auth, then the model allow-list,
//! and only then token derivation — a rejected request must never pay for
//! (or leak the existence of) a challenge run.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info};

use stile_humanizer::{TokenProvider, TokenSource};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::streaming::{openai_chunks, upstream_events};
use crate::translation::{build_upstream_payload, unix_now, ResponseAccumulator};
use crate::types::{ChatCompletionRequest, Model, ModelsResponse};
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub upstream: UpstreamClient,
    pub tokens: Arc<dyn TokenSource>,
}

pub async fn serve(config: GatewayConfig) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    info!(addr = %addr, models = config.models.len(), "stile gateway listening");

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build reqwest client")?;

    let tokens: Arc<dyn TokenSource> =
        Arc::new(TokenProvider::new(client.clone(), config.provider_config()));
    let upstream = UpstreamClient::new(
        client,
        config.upstream_chat_url.clone(),
        config.fingerprint.user_agent.clone(),
    );
    let state = web::Data::new(AppState {
        config,
        upstream,
        tokens,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Route table, shared between [`serve`] and the integration tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/v1/models", web::get().to(list_models))
        .route("/v1/chat/completions", web::post().to(chat_completions));
}

async fn health_check() -> &'static str {
    "OK"
}

fn authorize(req: &HttpRequest, expected: &SecretString) -> Result<(), GatewayError> {
    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if key == expected.expose_secret() => Ok(()),
        _ => Err(GatewayError::Unauthorized),
    }
}

async fn list_models(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
    authorize(&req, &state.config.api_key)?;

    let created = unix_now();
    let data = state
        .config
        .models
        .iter()
        .map(|id| Model {
            id: id.clone(),
            object: "model".to_string(),
            created,
            owned_by: String::new(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ModelsResponse {
        object: "list".to_string(),
        data,
    }))
}

async fn chat_completions(
    state: web::Data<AppState>,
    req_http: HttpRequest,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, GatewayError> {
    authorize(&req_http, &state.config.api_key)?;
    let request = body.into_inner();

    if !state.config.models.iter().any(|m| m == &request.model) {
        debug!(model = %request.model, "rejected model outside the allow-list");
        return Err(GatewayError::UnknownModel(request.model));
    }

    let token = state.tokens.token().await.map_err(|e| {
        error!(error = %e, "token derivation failed");
        GatewayError::from(e)
    })?;

    let payload = build_upstream_payload(&request);
    let response = state.upstream.send_chat(&payload, &token).await?;
    let events = upstream_events(response);

    if request.stream {
        let mut chunks = Box::pin(openai_chunks(events, request.model));

        // Pull the first frame before committing to an SSE response, so a
        // failure before the first byte is a proper JSON error and not a
        // broken stream.
        let first = match chunks.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e),
            None => return Err(GatewayError::StreamInterrupted),
        };

        let body = stream::once(async move { Ok::<_, GatewayError>(first) })
            .chain(chunks)
            .map(|item| {
                item.map(web::Bytes::from).map_err(|e| {
                    error!(error = %e, "response stream failed mid-flight");
                    actix_web::error::ErrorInternalServerError(e.to_string())
                })
            });

        return Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header(("cache-control", "no-cache"))
            .streaming(body));
    }

    let mut accumulator = ResponseAccumulator::new();
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        accumulator.push(&event?);
    }

    Ok(HttpResponse::Ok().json(accumulator.into_response(request.model)))
}
