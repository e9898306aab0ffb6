use axum::response::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::{
    error::ErrorBody,
    handlers::{auth, health, me},
};

/// Document for every served route. Title, version, description, contact
/// and license come from Cargo metadata.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::status,
        auth::authorize,
        auth::callback,
        auth::refresh,
        me::me,
        me::whoami,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        health::Status,
        auth::AuthorizeResponse,
        auth::TokenResponse,
        me::MeResponse,
        me::WhoAmIResponse,
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "auth", description = "OAuth login and refresh rotation"),
        (name = "me", description = "Caller identity"),
        (name = "system", description = "Health and status"),
    )
)]
struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

// axum handler for the OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
