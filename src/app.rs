use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    app_state::AppState, config::CorsConfig, middleware::NEW_ACCESS_TOKEN_HEADER, routes, swagger,
};

/// Assembles every route, the Swagger UI and the HTTP layers into a ready-to-serve router.
pub fn build_router(state: AppState, cors: &CorsConfig) -> Result<Router> {
    let routes = routes::routes_with_openapi(state.clone());

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("MedBook HospitalService API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let app = Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .layer(cors_layer(cors)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

fn cors_layer(cors: &CorsConfig) -> Result<CorsLayer> {
    if cors.allowed_origins.iter().any(|origin| origin == "*") {
        anyhow::bail!("Wildcard CORS origin cannot be combined with credentials");
    }

    let origins = cors
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([NEW_ACCESS_TOKEN_HEADER.clone()])
        .allow_credentials(true))
}
