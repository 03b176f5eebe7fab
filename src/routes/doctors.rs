use anyhow::Context;
use axum::{
    Extension,
    extract::State,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::{AppPath, AppQuery},
    auth::{CurrentUser, policy::require_role},
    middleware,
    models::{Role, UserEntity, UserRes},
    schema::users,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/doctors",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_doctors))
            .routes(utoipa_axum::routes!(get_doctor))
            .routes(utoipa_axum::routes!(confirm_doctor))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authentication,
            )),
    )
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct DoctorsQuery {
    /// Only return doctors whose account was confirmed by an admin.
    confirmed: Option<bool>,
}

/// Fetch doctor accounts, optionally only the confirmed ones.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Doctors"],
    security(("bearerAuth" = [])),
    params(DoctorsQuery),
    responses(
        (status = 200, description = "List doctors", body = StdResponse<Vec<UserRes>, String>)
    )
)]
async fn get_doctors(
    AppQuery(query): AppQuery<DoctorsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut doctors_query = users::table
        .filter(users::role.eq(Role::Doctor.as_str()))
        .order_by(users::surname.asc())
        .into_boxed();

    if let Some(confirmed) = query.confirmed {
        doctors_query = doctors_query.filter(users::is_confirmed.eq(confirmed));
    }

    let doctors: Vec<UserEntity> = doctors_query
        .get_results(conn)
        .await
        .context("Failed to get doctors")?;

    Ok(StdResponse {
        data: Some(doctors.into_iter().map(UserRes::from).collect::<Vec<_>>()),
        message: Some("Get doctors successfully"),
    })
}

/// Fetch a specific doctor.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Doctors"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Doctor ID to fetch")
    ),
    responses(
        (status = 200, description = "Get doctor successfully", body = StdResponse<UserRes, String>)
    )
)]
async fn get_doctor(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let doctor: UserEntity = users::table
        .find(id)
        .filter(users::role.eq(Role::Doctor.as_str()))
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(UserRes::from(doctor)),
        message: Some("Get doctor successfully"),
    })
}

/// Confirm a doctor's registration. Admin only; confirming twice is a no-op.
#[utoipa::path(
    patch,
    path = "/{id}/confirm",
    tags = ["Doctors"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Doctor ID to confirm")
    ),
    responses(
        (status = 200, description = "Confirmed doctor successfully", body = StdResponse<UserRes, String>),
        (status = 400, description = "Target user is not a doctor"),
        (status = 403, description = "Caller is not an admin")
    )
)]
async fn confirm_doctor(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, Role::Admin)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let confirmed_doctor = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let target: UserEntity = users::table.find(id).get_result(conn).await?;

                if target.role != Role::Doctor.as_str() {
                    return Err(AppError::BadRequest(format!(
                        "User #{} is not a doctor",
                        id
                    )));
                }

                let confirmed_doctor: UserEntity = diesel::update(users::table.find(id))
                    .set(users::is_confirmed.eq(true))
                    .returning(UserEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to confirm doctor")?;

                Ok::<UserEntity, AppError>(confirmed_doctor)
            })
        })
        .await?;

    info!(
        "Doctor #{} confirmed by admin {}",
        confirmed_doctor.id, user.username
    );

    Ok(StdResponse {
        data: Some(UserRes::from(confirmed_doctor)),
        message: Some("Confirmed doctor successfully"),
    })
}
