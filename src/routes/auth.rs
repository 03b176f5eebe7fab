use anyhow::Context;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::{AppForm, AppJson, AppPath},
    auth::{CurrentUser, password, token::TokenPair},
    models::{CreateUserEntity, Role, UserEntity, UserRes},
    schema::users,
};

/// Public identity routes: registration and token handling.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(register))
        .routes(utoipa_axum::routes!(login_for_access_token))
        .routes(utoipa_axum::routes!(verify_token))
        .routes(utoipa_axum::routes!(refresh_token))
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub name: String,
    pub surname: String,
}

impl RegisterReq {
    fn validate(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() {
            return Err(AppError::BadRequest("Username must not be empty".into()));
        }
        if self.password.is_empty() {
            return Err(AppError::BadRequest("Password must not be empty".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::BadRequest(format!(
                "{} is not a valid email address",
                self.email
            )));
        }
        Ok(())
    }
}

/// Register a new admin, doctor or patient account.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Auth"],
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Registered successfully", body = StdResponse<UserRes, String>),
        (status = 409, description = "Username or email already taken")
    )
)]
async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterReq>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: i64 = users::table
        .filter(users::username.eq(&body.username))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check username")?;

    if existing > 0 {
        return Err(AppError::Conflict("User already exists".into()));
    }

    let hashed_password = password::hash_password(body.password).await?;

    let user: UserEntity = diesel::insert_into(users::table)
        .values(CreateUserEntity {
            username: body.username,
            email: body.email,
            name: body.name,
            surname: body.surname,
            hashed_password,
            role: body.role.as_str().into(),
        })
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await?;

    info!("Registered {} #{} as {}", user.username, user.id, user.role);

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(UserRes::from(user)),
            message: Some("Registered successfully"),
        },
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct TokenReq {
    pub username: String,
    pub password: String,
}

/// Exchange username and password for an access/refresh token pair (OAuth2 password flow).
#[utoipa::path(
    post,
    path = "/token",
    tags = ["Auth"],
    request_body(content = TokenReq, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Authenticated", body = TokenPair),
        (status = 401, description = "Incorrect username or password")
    )
)]
async fn login_for_access_token(
    State(state): State<AppState>,
    AppForm(form): AppForm<TokenReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user = authenticate(conn, form.username, form.password).await?;
    let pair = state.tokens.issue_pair(&user.username, user.role)?;

    info!("Issued tokens for {}", user.username);

    Ok(Json(pair))
}

/// Resolves a username/password pair into the user it belongs to.
/// Unknown users and wrong passwords fail the same way.
async fn authenticate(
    conn: &mut diesel_async::AsyncPgConnection,
    username: String,
    password: String,
) -> Result<CurrentUser, AppError> {
    let invalid = || AppError::Unauthorized("Incorrect username or password".into());

    let user: UserEntity = users::table
        .filter(users::username.eq(&username))
        .get_result(conn)
        .await
        .optional()
        .context("Failed to look up user")?
        .ok_or_else(invalid)?;

    if !password::verify_password(password, user.hashed_password.clone()).await? {
        return Err(invalid());
    }

    CurrentUser::try_from(user)
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VerifyTokenRes {
    pub role: Role,
    pub user_id: i32,
    pub name: String,
    pub access_token: String,
}

/// Validate an access token and get the caller's identity with a renewed token.
#[utoipa::path(
    get,
    path = "/verify-token/{token}",
    tags = ["Auth"],
    params(
        ("token" = String, Path, description = "Access token to verify")
    ),
    responses(
        (status = 200, description = "Token is valid", body = StdResponse<VerifyTokenRes, String>),
        (status = 401, description = "Token is invalid or expired"),
        (status = 404, description = "Token subject no longer exists")
    )
)]
async fn verify_token(
    AppPath(token): AppPath<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.tokens.verify_access_token(&token)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = users::table
        .filter(users::username.eq(&claims.sub))
        .get_result(conn)
        .await?;
    let user = CurrentUser::try_from(user)?;

    let access_token = state.tokens.issue_access_token(&user.username, user.role)?;

    Ok(StdResponse {
        data: Some(VerifyTokenRes {
            role: user.role,
            user_id: user.id,
            name: user.name,
            access_token,
        }),
        message: Some("Token is valid"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshTokenReq {
    pub refresh_token: String,
}

/// Trade a refresh token for a new access/refresh token pair.
#[utoipa::path(
    post,
    path = "/refresh-token",
    tags = ["Auth"],
    request_body = RefreshTokenReq,
    responses(
        (status = 200, description = "Refreshed", body = TokenPair),
        (status = 401, description = "Refresh token is invalid or expired")
    )
)]
async fn refresh_token(
    State(state): State<AppState>,
    AppJson(body): AppJson<RefreshTokenReq>,
) -> Result<impl IntoResponse, AppError> {
    let claims = state.tokens.verify_refresh_token(&body.refresh_token)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = users::table
        .filter(users::username.eq(&claims.sub))
        .get_result(conn)
        .await
        .optional()
        .context("Failed to look up token subject")?
        .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".into()))?;
    let user = CurrentUser::try_from(user)?;

    Ok(Json(state.tokens.issue_pair(&user.username, user.role)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(username: &str, email: &str, password: &str) -> RegisterReq {
        RegisterReq {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: Role::Patient,
            name: "Rebecca".into(),
            surname: "Adler".into(),
        }
    }

    #[test]
    fn registration_requires_username_password_and_email() {
        assert!(req("adler", "adler@medbook.test", "pw").validate().is_ok());
        assert!(matches!(
            req("  ", "adler@medbook.test", "pw").validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(req("adler", "adler@medbook.test", "").validate().is_err());
        assert!(req("adler", "not-an-email", "pw").validate().is_err());
    }
}
