use anyhow::Result;
use utoipa::openapi::{
    ComponentsBuilder, OpenApi,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

/// Serves the generated document at `/api-docs/openapi.json` with the UI at `/swagger-ui`.
pub fn create_swagger_ui(mut openapi: OpenApi) -> Result<SwaggerUi> {
    let bearer = SecurityScheme::Http(
        HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .build(),
    );

    match openapi.components.as_mut() {
        Some(components) => components.add_security_scheme("bearerAuth", bearer),
        None => {
            openapi.components = Some(
                ComponentsBuilder::new()
                    .security_scheme("bearerAuth", bearer)
                    .build(),
            )
        }
    }

    Ok(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
}
