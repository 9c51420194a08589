//! HTTP wiring: the lead submission endpoint, the buyer webhook endpoint, and
//! a health check, following the teacher's axum `Router`/`Extension` pattern.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lead_core::domain::{ComplianceData, Timeframe};
use lead_core::value::Value;
use lead_core::Error as CoreError;
use lead_store::PersistenceGateway;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submission::{SubmissionInput, SubmissionService};
use crate::webhook::{WebhookReceiver, WebhookStatus};

#[derive(Debug, Deserialize)]
pub struct SubmitLeadRequest {
    pub service_type_id: Uuid,
    pub zip_code: String,
    pub owns_home: bool,
    pub timeframe: Timeframe,
    pub form_data: Value,
    pub compliance: ComplianceData,
}

#[derive(Debug, Serialize)]
pub struct SubmitLeadResponse {
    pub lead_id: Uuid,
    pub status: String,
}

async fn handle_submit_lead<G: PersistenceGateway>(
    Extension(submission): Extension<Arc<SubmissionService<G>>>,
    Json(request): Json<SubmitLeadRequest>,
) -> Result<Json<SubmitLeadResponse>, CoreError> {
    let input = SubmissionInput {
        service_type_id: request.service_type_id,
        zip_code: request.zip_code,
        owns_home: request.owns_home,
        timeframe: request.timeframe,
        form_data: request.form_data,
        compliance: request.compliance,
    };
    let output = submission.submit_lead(input).await?;
    Ok(Json(SubmitLeadResponse {
        lead_id: output.lead_id,
        status: format!("{:?}", output.status).to_uppercase(),
    }))
}

async fn handle_webhook<G: PersistenceGateway>(
    Path(buyer_name): Path<String>,
    Extension(receiver): Extension<Arc<WebhookReceiver<G>>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let signature = headers.get("X-Signature").and_then(|v| v.to_str().ok()).unwrap_or("");
    match receiver.handle(&buyer_name, &body, signature).await {
        Ok(WebhookStatus::Accepted) => StatusCode::OK.into_response(),
        Ok(WebhookStatus::MalformedBody) => StatusCode::BAD_REQUEST.into_response(),
        Ok(WebhookStatus::MalformedSignature) => StatusCode::UNAUTHORIZED.into_response(),
        Ok(WebhookStatus::ForbiddenBuyer) => StatusCode::FORBIDDEN.into_response(),
        Ok(WebhookStatus::UnknownOrInactiveBuyer) | Ok(WebhookStatus::UnknownLead) => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn handle_health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Exposes the C10 Prometheus registry for scraping (SPEC_FULL §4.9/C10).
async fn handle_metrics() -> Response {
    use prometheus::{Encoder, TextEncoder};

    let metric_families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ([(axum::http::header::CONTENT_TYPE, encoder.format_type())], buffer).into_response()
}

pub struct Server<G: PersistenceGateway> {
    host: Ipv4Addr,
    port: u16,
    submission: Arc<SubmissionService<G>>,
    webhook: Arc<WebhookReceiver<G>>,
}

impl<G: PersistenceGateway + 'static> Server<G> {
    pub fn new(
        host: Ipv4Addr,
        port: u16,
        submission: Arc<SubmissionService<G>>,
        webhook: Arc<WebhookReceiver<G>>,
    ) -> Self {
        Self { host, port, submission, webhook }
    }

    pub async fn run(&self) {
        let router = Router::new()
            .route("/health", get(handle_health_check))
            .route("/metrics", get(handle_metrics))
            .route("/leads", post(handle_submit_lead::<G>))
            .route("/webhooks/buyers/:buyer_name", post(handle_webhook::<G>))
            .layer(Extension(self.submission.clone()))
            .layer(Extension(self.webhook.clone()));

        let addr = SocketAddr::from((self.host, self.port));
        let server = axum::Server::bind(&addr).serve(router.into_make_service());

        tracing::info!("listening at {addr}...");
        if let Err(err) = server.await {
            tracing::error!("error while serving HTTP: {err}");
        }
    }
}
