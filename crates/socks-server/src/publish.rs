//! `POST /v1/send`: authenticated publish into the fan-out engine.

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::broadcast::spawn_fan_out;
use crate::channels::{ChannelSet, channels_field, is_blank};
use crate::errors::PublishError;
use crate::metrics::{EVENTS_PUBLISHED_TOTAL, PUBLISH_REJECTED_TOTAL};
use crate::server::AppState;

/// Largest publish body read after authorization.
pub const MAX_PUBLISH_BODY: usize = 16 * 1024 * 1024;

/// A validated publish body.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishRequest {
    /// Target channels, non-empty.
    pub channels: ChannelSet,
    /// Opaque payload, forwarded verbatim.
    pub event: Value,
}

/// Check the `Authorization` header against the shared secret.
///
/// The header value must equal the secret exactly; no scheme prefix.
pub fn authorize(headers: &HeaderMap, secret: &SecretString) -> Result<(), PublishError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .ok_or(PublishError::Unauthorized)?;
    if presented.as_bytes() == secret.expose_secret().as_bytes() {
        Ok(())
    } else {
        Err(PublishError::Unauthorized)
    }
}

/// Parse and validate a publish body.
pub fn parse_publish(body: &[u8]) -> Result<PublishRequest, PublishError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| PublishError::BadRequest("body is not JSON"))?;
    let channels = channels_field(&value)
        .map_err(|_| PublishError::BadRequest("channels must be a non-empty array of strings"))?;
    let event = match value.get("event") {
        Some(event) if !is_blank(event) => event.clone(),
        _ => return Err(PublishError::BadRequest("event is required")),
    };
    Ok(PublishRequest { channels, event })
}

/// POST /v1/send
///
/// The `Authorization` header is checked before the body is read. Responds
/// `201` as soon as the request is valid; delivery happens on a detached
/// task and never affects the response.
pub async fn send_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<StatusCode, PublishError> {
    let publish = read_publish(&state.secret, request)
        .await
        .inspect_err(|e| {
            warn!(error = %e, "publish rejected");
            counter!(PUBLISH_REJECTED_TOTAL, "reason" => e.reason()).increment(1);
        })?;

    debug!(channels = ?publish.channels.to_sorted_vec(), "publish accepted");
    counter!(EVENTS_PUBLISHED_TOTAL).increment(1);
    drop(spawn_fan_out(
        state.registry.clone(),
        publish.channels,
        publish.event,
    ));
    Ok(StatusCode::CREATED)
}

/// Authorize, then read and validate the body.
async fn read_publish(
    secret: &SecretString,
    request: Request,
) -> Result<PublishRequest, PublishError> {
    authorize(request.headers(), secret)?;
    let body = to_bytes(request.into_body(), MAX_PUBLISH_BODY)
        .await
        .map_err(|_| PublishError::BadRequest("body is too large or unreadable"))?;
    parse_publish(&body)
}
