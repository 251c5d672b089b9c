//! 系统提示词管理处理器

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::{error, info, instrument};

use crate::presentation::dto::SavePromptRequest;
use crate::presentation::routes::AppState;
use crate::shared::types::OperationResponse;

/// GET /get_prompt
#[instrument(skip(state))]
pub async fn get_prompt(State(state): State<AppState>) -> Response {
    let prompts = state.pipeline.prompts();
    match prompts.read_raw().await {
        Ok(Some(content)) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            format!("El archivo {} no existe.", prompts.path().display()),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /save_prompt
#[instrument(skip(state, body))]
pub async fn save_prompt(State(state): State<AppState>, body: Bytes) -> Response {
    let content = serde_json::from_slice::<SavePromptRequest>(&body)
        .ok()
        .and_then(|request| request.content);

    let Some(content) = content else {
        return (
            StatusCode::BAD_REQUEST,
            Json(OperationResponse::error("Contenido no proporcionado")),
        )
            .into_response();
    };

    match state.pipeline.prompts().save(&content).await {
        Ok(()) => {
            info!("📝 系统提示词已更新");
            Json(OperationResponse::ok()).into_response()
        }
        Err(e) => {
            error!("❌ 保存系统提示词失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(OperationResponse::error(e.to_string())),
            )
                .into_response()
        }
    }
}
