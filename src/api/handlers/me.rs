//! Caller identity endpoints.

use axum::{extract::Extension, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::error::{ApiError, ErrorBody},
    principal::{Actor, RequestContext},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIResponse {
    pub actor_id: Option<String>,
    pub kind: String,
    pub role: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "The authenticated user", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn me(
    Extension(context): Extension<RequestContext>,
) -> Result<Json<MeResponse>, ApiError> {
    let user = context.require_user()?;
    Ok(Json(MeResponse {
        user_id: user.actor_id(),
        role: user.role_tag().to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/whoami",
    responses(
        (status = 200, description = "The calling actor; anonymous callers become guests", body = WhoAmIResponse),
        (status = 429, description = "Too many requests", body = ErrorBody)
    ),
    tag = "me"
)]
pub async fn whoami(Extension(context): Extension<RequestContext>) -> Json<WhoAmIResponse> {
    let response = match context.principal.actor() {
        Some(actor) => WhoAmIResponse {
            actor_id: Some(actor.actor_id()),
            kind: actor.kind().to_string(),
            role: Some(actor.role_tag().to_string()),
        },
        None => WhoAmIResponse {
            actor_id: None,
            kind: "anonymous".to_string(),
            role: None,
        },
    };
    Json(response)
}
