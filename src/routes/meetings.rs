use anyhow::Context;
use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use diesel::{BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
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
        CurrentUser,
        policy::{require_meeting_participant, require_owning_doctor, require_role},
    },
    middleware,
    models::{CreateMeetingEntity, MeetingDecision, MeetingEntity, MeetingStatus, Role, UserEntity},
    schema::{meetings, users},
};

/// Scheduling routes: meeting requests and the doctor's decision on them.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/meetings",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_meetings))
            .routes(utoipa_axum::routes!(request_meeting))
            .routes(utoipa_axum::routes!(get_my_meetings))
            .routes(utoipa_axum::routes!(get_meeting))
            .routes(utoipa_axum::routes!(update_meeting))
            .routes(utoipa_axum::routes!(delete_meeting))
            .routes(utoipa_axum::routes!(confirm_meeting))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authentication,
            )),
    )
}

/// Fetch all meetings in the system.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all meetings", body = StdResponse<Vec<MeetingEntity>, String>)
    )
)]
async fn get_meetings(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    // Unscoped listing. /meetings/my-meetings is the per-caller view.
    let meetings: Vec<MeetingEntity> = meetings::table
        .order_by(meetings::scheduled_date.asc())
        .get_results(conn)
        .await
        .context("Failed to get meetings")?;

    Ok(StdResponse {
        data: Some(meetings),
        message: Some("Get meetings successfully"),
    })
}

/// Fetch all meetings the authenticated user takes part in, as patient or doctor.
#[utoipa::path(
    get,
    path = "/my-meetings",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my meetings", body = StdResponse<Vec<MeetingEntity>, String>)
    )
)]
async fn get_my_meetings(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let meetings: Vec<MeetingEntity> = meetings::table
        .filter(
            meetings::patient_id
                .eq(user.id)
                .or(meetings::doctor_id.eq(user.id)),
        )
        .order_by(meetings::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my meetings")?;

    Ok(StdResponse {
        data: Some(meetings),
        message: Some("Get my meetings successfully"),
    })
}

/// Fetch a specific meeting.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Meeting ID to fetch")
    ),
    responses(
        (status = 200, description = "Get meeting successfully", body = StdResponse<MeetingEntity, String>)
    )
)]
async fn get_meeting(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let meeting: MeetingEntity = meetings::table.find(id).get_result(conn).await?;

    Ok(StdResponse {
        data: Some(meeting),
        message: Some("Get meeting successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct RequestMeetingReq {
    pub patient_id: i32,
    pub doctor_id: i32,
    pub scheduled_date: DateTime<Utc>,
}

/// Request a meeting with a doctor. The caller must be the patient named in the request.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    request_body = RequestMeetingReq,
    responses(
        (status = 201, description = "Requested meeting successfully", body = StdResponse<MeetingEntity, String>),
        (status = 403, description = "Caller is not the referenced patient"),
        (status = 404, description = "Doctor not found")
    )
)]
async fn request_meeting(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<RequestMeetingReq>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, Role::Patient)?;
    if user.id != body.patient_id {
        return Err(AppError::ForbiddenResource(
            "Patients can only request meetings for themselves".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let meeting = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let doctor: UserEntity = users::table.find(body.doctor_id).get_result(conn).await?;

                if doctor.role != Role::Doctor.as_str() {
                    return Err(AppError::BadRequest(format!(
                        "User #{} is not a doctor",
                        doctor.id
                    )));
                }

                let meeting = diesel::insert_into(meetings::table)
                    .values(CreateMeetingEntity {
                        patient_id: body.patient_id,
                        doctor_id: doctor.id,
                        scheduled_date: body.scheduled_date,
                        status: MeetingStatus::Pending.as_str().into(),
                    })
                    .returning(MeetingEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create meeting")?;

                Ok::<MeetingEntity, AppError>(meeting)
            })
        })
        .await?;

    info!(
        "Meeting #{} requested by patient #{} with doctor #{}",
        meeting.id, meeting.patient_id, meeting.doctor_id
    );

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(meeting),
            message: Some("Requested meeting successfully"),
        },
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateMeetingReq {
    pub scheduled_date: DateTime<Utc>,
}

/// Reschedule a meeting. Only its patient or doctor may do so.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Meeting ID to update")
    ),
    request_body = UpdateMeetingReq,
    responses(
        (status = 200, description = "Updated meeting successfully", body = StdResponse<MeetingEntity, String>)
    )
)]
async fn update_meeting(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<UpdateMeetingReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_meeting = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let meeting: MeetingEntity = meetings::table.find(id).get_result(conn).await?;
                require_meeting_participant(&user, &meeting)?;

                let updated_meeting = diesel::update(meetings::table.find(id))
                    .set(meetings::scheduled_date.eq(body.scheduled_date))
                    .returning(MeetingEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update meeting")?;

                Ok::<MeetingEntity, AppError>(updated_meeting)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(updated_meeting),
        message: Some("Updated meeting successfully"),
    })
}

/// Delete a meeting along with its medical records and their medicines.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Meeting ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted meeting successfully", body = StdResponse<MeetingEntity, String>)
    )
)]
async fn delete_meeting(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted_meeting = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let meeting: MeetingEntity = meetings::table.find(id).get_result(conn).await?;
                require_meeting_participant(&user, &meeting)?;

                let deleted_meeting = diesel::delete(meetings::table.find(id))
                    .returning(MeetingEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to delete meeting")?;

                Ok::<MeetingEntity, AppError>(deleted_meeting)
            })
        })
        .await?;

    info!("Meeting #{} deleted", deleted_meeting.id);

    Ok(StdResponse {
        data: Some(deleted_meeting),
        message: Some("Meeting deleted successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmMeetingReq {
    /// `1` (or `"Reject"`) rejects the meeting, `2` (or `"Confirmed"`) confirms it.
    pub status: MeetingDecision,
}

/// Confirm or reject a pending meeting. Only the meeting's doctor may decide.
#[utoipa::path(
    patch,
    path = "/{id}/confirm",
    tags = ["Meetings"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Meeting ID to decide on")
    ),
    request_body = ConfirmMeetingReq,
    responses(
        (status = 200, description = "Decided on meeting successfully", body = StdResponse<MeetingEntity, String>),
        (status = 400, description = "Unrecognized decision"),
        (status = 403, description = "Caller is not the meeting's doctor"),
        (status = 404, description = "Meeting not found"),
        (status = 409, description = "Meeting was already decided")
    )
)]
async fn confirm_meeting(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<ConfirmMeetingReq>,
) -> Result<impl IntoResponse, AppError> {
    let next_status = body.status.into_status()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let decided_meeting = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let meeting: MeetingEntity = meetings::table.find(id).get_result(conn).await?;
                require_owning_doctor(&user, meeting.doctor_id)?;

                let current_status = meeting.status.parse::<MeetingStatus>()?;
                if !current_status.can_transition_to(next_status) {
                    return Err(AppError::Conflict(format!(
                        "Meeting #{} is already {}",
                        id, current_status
                    )));
                }

                // Guarded on Pending so a concurrent decision cannot be overwritten.
                let decided_meeting: MeetingEntity = diesel::update(
                    meetings::table
                        .find(id)
                        .filter(meetings::status.eq(MeetingStatus::Pending.as_str())),
                )
                .set(meetings::status.eq(next_status.as_str()))
                .returning(MeetingEntity::as_returning())
                .get_result(conn)
                .await
                .optional()
                .context("Failed to update meeting status")?
                .ok_or_else(|| {
                    AppError::Conflict(format!("Meeting #{} was decided concurrently", id))
                })?;

                Ok::<MeetingEntity, AppError>(decided_meeting)
            })
        })
        .await?;

    info!(
        "Meeting #{} marked {} by doctor #{}",
        decided_meeting.id, decided_meeting.status, decided_meeting.doctor_id
    );

    Ok(StdResponse {
        data: Some(decided_meeting),
        message: Some("Decided on meeting successfully"),
    })
}
