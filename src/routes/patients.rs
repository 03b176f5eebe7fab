use anyhow::Context;
use axum::{
    extract::State,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::AppPath,
    middleware,
    models::{Role, UserEntity, UserRes},
    schema::users,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/patients",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_patients))
            .routes(utoipa_axum::routes!(get_patient))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authentication,
            )),
    )
}

/// Fetch all patient accounts.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Patients"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all patients", body = StdResponse<Vec<UserRes>, String>)
    )
)]
async fn get_patients(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let patients: Vec<UserEntity> = users::table
        .filter(users::role.eq(Role::Patient.as_str()))
        .order_by(users::surname.asc())
        .get_results(conn)
        .await
        .context("Failed to get patients")?;

    Ok(StdResponse {
        data: Some(patients.into_iter().map(UserRes::from).collect::<Vec<_>>()),
        message: Some("Get patients successfully"),
    })
}

/// Fetch a specific patient.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Patients"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Patient ID to fetch")
    ),
    responses(
        (status = 200, description = "Get patient successfully", body = StdResponse<UserRes, String>)
    )
)]
async fn get_patient(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let patient: UserEntity = users::table
        .find(id)
        .filter(users::role.eq(Role::Patient.as_str()))
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(UserRes::from(patient)),
        message: Some("Get patient successfully"),
    })
}
