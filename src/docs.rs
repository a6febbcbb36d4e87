use utoipa::OpenApi;
use crate::common::response::{ErrorBody, HealthResponse};
use crate::modules::optimize::dto::{AudioCodec, CompressionOptions, Preset, VideoCodec};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::modules::optimize::handler::optimize_video,
    ),
    components(
        schemas(
            ErrorBody, HealthResponse,
            CompressionOptions, Preset, VideoCodec, AudioCodec,
        )
    ),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Optimize", description = "Video re-encoding")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

use utoipa::Modify;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::middleware::auth::API_KEY_HEADER,
                ))),
            );
        }
    }
}
