use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;

use crate::{
    app_error::AppError, app_state::AppState, auth::CurrentUser, models::UserEntity,
    schema::users,
};

/// Response header carrying a renewed access token on every authenticated call.
pub static NEW_ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-new-access-token");

/// Resolves the bearer token into a [`CurrentUser`] extension and renews the
/// access token on the way out.
pub async fn authentication(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)?;
    let claims = state.tokens.verify_access_token(token)?;

    // The connection goes back to the pool before the handler asks for its own.
    let user: UserEntity = {
        let conn = &mut state
            .db_pool
            .get()
            .await
            .context("Failed to obtain a DB connection pool")?;

        users::table
            .filter(users::username.eq(&claims.sub))
            .get_result(conn)
            .await
            .optional()
            .context("Failed to look up token subject")?
            .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".into()))?
    };

    let current_user = CurrentUser::try_from(user)?;
    let renewed = state
        .tokens
        .issue_access_token(&current_user.username, current_user.role)?;

    req.extensions_mut().insert(current_user);
    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&renewed) {
        response
            .headers_mut()
            .insert(NEW_ACCESS_TOKEN_HEADER.clone(), value);
    }
    Ok(response)
}

fn bearer_token(req: &Request) -> Result<&str, AppError> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(authorization: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/meetings");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn extracts_bearer_token() {
        let req = request(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn rejects_missing_or_foreign_schemes() {
        assert!(bearer_token(&request(None)).is_err());
        assert!(bearer_token(&request(Some("Basic dXNlcjpwYXNz"))).is_err());
        assert!(bearer_token(&request(Some("Bearer "))).is_err());
    }
}
