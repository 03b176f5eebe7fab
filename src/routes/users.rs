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
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::{AppJson, AppPath},
    auth::{
        CurrentUser, password,
        policy::{require_role, require_self_or_admin},
    },
    middleware,
    models::{Role, UpdateUserEntity, UserEntity, UserRes},
    schema::users,
};

/// Account management routes. All of them require a bearer token.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/users",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_users))
            .routes(utoipa_axum::routes!(get_me))
            .routes(utoipa_axum::routes!(get_user))
            .routes(utoipa_axum::routes!(update_user))
            .routes(utoipa_axum::routes!(delete_user))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authentication,
            )),
    )
}

/// Fetch every user account. Admin only.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all users", body = StdResponse<Vec<UserRes>, String>)
    )
)]
async fn get_users(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, Role::Admin)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let users: Vec<UserEntity> = users::table
        .order_by(users::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get users")?;

    Ok(StdResponse {
        data: Some(users.into_iter().map(UserRes::from).collect::<Vec<_>>()),
        message: Some("Get users successfully"),
    })
}

/// Fetch the authenticated user's own account.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get my account", body = StdResponse<UserRes, String>)
    )
)]
async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let me: UserEntity = users::table.find(user.id).get_result(conn).await?;

    Ok(StdResponse {
        data: Some(UserRes::from(me)),
        message: Some("Get my account successfully"),
    })
}

/// Fetch a specific user account. Only the account owner or an admin may read it.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "User ID to fetch")
    ),
    responses(
        (status = 200, description = "Get user successfully", body = StdResponse<UserRes, String>)
    )
)]
async fn get_user(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    require_self_or_admin(&user, id)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let found: UserEntity = users::table.find(id).get_result(conn).await?;

    Ok(StdResponse {
        data: Some(UserRes::from(found)),
        message: Some("Get user successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserReq {
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    /// Leave out to keep the current password.
    pub password: Option<String>,
}

/// Update a user's profile. Role and confirmation status are not editable here.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "User ID to update")
    ),
    request_body = UpdateUserReq,
    responses(
        (status = 200, description = "Updated user successfully", body = StdResponse<UserRes, String>),
        (status = 409, description = "Username or email already taken")
    )
)]
async fn update_user(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<UpdateUserReq>,
) -> Result<impl IntoResponse, AppError> {
    require_self_or_admin(&user, id)?;

    if body.username.trim().is_empty() {
        return Err(AppError::BadRequest("Username must not be empty".into()));
    }

    let hashed_password = match body.password {
        Some(password) if !password.is_empty() => Some(password::hash_password(password).await?),
        _ => None,
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_user = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let taken: i64 = users::table
                    .filter(users::username.eq(&body.username))
                    .filter(users::id.ne(id))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to check username")?;

                if taken > 0 {
                    return Err(AppError::Conflict("User already exists".into()));
                }

                let updated_user: UserEntity = diesel::update(users::table.find(id))
                    .set(UpdateUserEntity {
                        username: body.username,
                        email: body.email,
                        name: body.name,
                        surname: body.surname,
                        hashed_password,
                    })
                    .returning(UserEntity::as_returning())
                    .get_result(conn)
                    .await?;

                Ok::<UserEntity, AppError>(updated_user)
            })
        })
        .await?;

    info!("User #{} updated by {}", updated_user.id, user.username);

    Ok(StdResponse {
        data: Some(UserRes::from(updated_user)),
        message: Some("Updated user successfully"),
    })
}

/// Delete a user account together with every meeting it takes part in.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "User ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted user successfully", body = StdResponse<UserRes, String>)
    )
)]
async fn delete_user(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    require_self_or_admin(&user, id)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted_user: UserEntity = diesel::delete(users::table.find(id))
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await?;

    info!("User #{} deleted by {}", deleted_user.id, user.username);

    Ok(StdResponse {
        data: Some(UserRes::from(deleted_user)),
        message: Some("User deleted successfully"),
    })
}
