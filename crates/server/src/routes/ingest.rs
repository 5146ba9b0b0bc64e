//! `POST <ingest_path>`: signed deliveries from a sending node.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use ingest::InboundRequest;
use protocol::TransportEnvelope;

use crate::error::ServerError;
use crate::state::ServerState;

/// Hand the raw body and envelope headers to the receiver pipeline.
///
/// The body is read as bytes, never re-serialized, because the signature
/// covers the exact bytes the sender produced.
pub async fn ingest_content(
    State(state): State<Arc<ServerState>>,
    request: Request,
) -> Result<Response, ServerError> {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let secure = is_secure(&request, state.config.trust_forwarded_proto);
    let envelope = envelope_from(request.headers());

    let limit = state.body_read_limit();
    let body = to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| ServerError::BodyTooLarge { limit })?;

    let pipeline = state.pipeline.clone();
    let (status, response) = tokio::task::spawn_blocking(move || {
        let inbound = InboundRequest {
            body: &body,
            envelope,
            remote_addr,
            secure,
        };
        pipeline.respond(&inbound, Utc::now())
    })
    .await
    .map_err(|e| ServerError::Internal(format!("ingest task failed: {e}")))?;

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(response)).into_response())
}

fn envelope_from(headers: &HeaderMap) -> TransportEnvelope {
    TransportEnvelope::from_headers(|name| headers.get(name).and_then(|v| v.to_str().ok()))
}

fn is_secure(request: &Request, trust_forwarded_proto: bool) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }
    trust_forwarded_proto
        && request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn forwarded_proto_counts_only_when_trusted() {
        let request = Request::builder()
            .uri("/bridge/v1/ingest")
            .header("x-forwarded-proto", "HTTPS")
            .body(Body::empty())
            .unwrap();
        assert!(is_secure(&request, true));
        assert!(!is_secure(&request, false));

        let direct = Request::builder()
            .uri("https://news.example/bridge/v1/ingest")
            .body(Body::empty())
            .unwrap();
        assert!(is_secure(&direct, false));
    }

    #[test]
    fn envelope_reads_bridge_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", "1700000000".parse().unwrap());
        headers.insert("x-nonce", "abc".parse().unwrap());
        headers.insert("x-signature", "def".parse().unwrap());
        let envelope = envelope_from(&headers);
        assert_eq!(envelope.timestamp, 1_700_000_000);
        assert_eq!(envelope.nonce, "abc");
        assert_eq!(envelope.origin_host, None);
    }
}
