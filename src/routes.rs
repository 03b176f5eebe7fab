use utoipa_axum::router::OpenApiRouter;

use crate::app_state::AppState;

pub mod auth;
pub mod doctors;
pub mod medical_records;
pub mod medicines;
pub mod meetings;
pub mod patients;
pub mod users;

/// Every HTTP route of the service. Only the auth routes are reachable without a bearer token.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    auth::routes_with_openapi()
        .merge(users::routes_with_openapi(state.clone()))
        .merge(patients::routes_with_openapi(state.clone()))
        .merge(doctors::routes_with_openapi(state.clone()))
        .merge(meetings::routes_with_openapi(state.clone()))
        .merge(medical_records::routes_with_openapi(state.clone()))
        .merge(medicines::routes_with_openapi(state))
}
