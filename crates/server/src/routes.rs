use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use maildesk_core::{
    FlowOrchestrator, InboundMessage, InterfaceError, ResponseDisposition, TicketStatus,
};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<FlowOrchestrator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new().route("/v1/messages", post(post_message)).with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub customer_id: String,
    pub text: String,
    #[serde(default)]
    pub ticket_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub ticket_id: String,
    pub status: TicketStatus,
    pub disposition: ResponseDisposition,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    correlation_id: String,
}

async fn post_message(
    State(state): State<ApiState>,
    Json(request): Json<MessageRequest>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    let mut message = InboundMessage::new(request.customer_id, request.text);
    if let Some(ticket_ref) = request.ticket_ref {
        message = message.with_ticket_ref(ticket_ref);
    }

    match state.engine.handle(message).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(MessageResponse {
                ticket_id: outcome.ticket_id.0,
                status: outcome.status,
                disposition: outcome.disposition,
                body: outcome.body,
            }),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(
                event_name = "api.message_rejected",
                correlation_id = correlation_id.as_str(),
                error = %error,
                "inbound message was not processed"
            );
            let interface = InterfaceError::from(error).with_correlation_id(correlation_id.clone());
            let status = match &interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorBody { error: interface.user_message().to_string(), correlation_id }),
            )
                .into_response()
        }
    }
}
