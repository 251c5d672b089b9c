//! 分类请求处理器

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::net::SocketAddr;
use tracing::{debug, instrument};

use crate::business::domain::ReplyKind;
use crate::presentation::dto::GenerateResponse;
use crate::presentation::routes::AppState;
use crate::shared::ClientId;

const UNKNOWN_CLIENT: &str = "0.0.0.0";

/// POST /generate
///
/// 请求体在限流检查之后才解析；无法解析的请求体视为空对象。
#[instrument(skip(state, connect_info, headers, body))]
pub async fn generate(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let client = client_id(state.config.server.trust_proxy, &headers, peer);
    debug!("📨 收到分类请求: 客户端 {}, 请求体 {} 字节", client, body.len());

    let payload = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);

    match state.pipeline.handle(&client, &payload).await {
        Ok(reply) => {
            let response = GenerateResponse::from(reply);
            let status = match response.kind {
                ReplyKind::StructuredData => StatusCode::OK,
                ReplyKind::ErrorFallback => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(response)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// 确定客户端标识：信任代理时取 X-Forwarded-For 的第一项，否则取对端地址
pub fn client_id(trust_proxy: bool, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientId {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(forwarded) = forwarded {
            return forwarded.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
