use anyhow::Context;
use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{BelongingToDsl, ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::{AppJson, AppPath},
    auth::{
        CurrentUser,
        policy::{require_meeting_participant, require_owning_doctor},
    },
    middleware,
    models::{CreateMedicalRecordEntity, MedicalRecordEntity, MedicineEntity, MeetingEntity},
    schema::{medical_records, meetings},
};

/// Clinical record routes, both under their parent meeting and on their own.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(add_medical_record))
        .routes(utoipa_axum::routes!(get_meeting_records))
        .nest(
            "/medical_records",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_medical_records))
                .routes(utoipa_axum::routes!(get_medical_record))
                .routes(utoipa_axum::routes!(update_medical_record))
                .routes(utoipa_axum::routes!(delete_medical_record)),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authentication,
        ))
}

/// Resolves the doctor owning a medical record through its meeting.
pub(crate) async fn record_doctor_id(
    conn: &mut AsyncPgConnection,
    record_id: i32,
) -> Result<i32, AppError> {
    let doctor_id = medical_records::table
        .inner_join(meetings::table)
        .filter(medical_records::id.eq(record_id))
        .select(meetings::doctor_id)
        .get_result::<i32>(conn)
        .await?;
    Ok(doctor_id)
}

#[derive(Deserialize, ToSchema)]
pub struct MedicalRecordReq {
    pub description: String,
}

/// Attach a medical record to a meeting. Only the meeting's doctor may do so.
#[utoipa::path(
    post,
    path = "/meetings/{id}/records",
    tags = ["Medical Records"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Meeting ID to attach the record to")
    ),
    request_body = MedicalRecordReq,
    responses(
        (status = 201, description = "Created medical record successfully", body = StdResponse<MedicalRecordEntity, String>),
        (status = 403, description = "Caller is not the meeting's doctor"),
        (status = 404, description = "Meeting not found")
    )
)]
async fn add_medical_record(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<MedicalRecordReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let record = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let meeting: MeetingEntity = meetings::table.find(id).get_result(conn).await?;
                require_owning_doctor(&user, meeting.doctor_id)?;

                let record = diesel::insert_into(medical_records::table)
                    .values(CreateMedicalRecordEntity {
                        meeting_id: meeting.id,
                        description: body.description,
                    })
                    .returning(MedicalRecordEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create medical record")?;

                Ok::<MedicalRecordEntity, AppError>(record)
            })
        })
        .await?;

    info!(
        "Medical record #{} added to meeting #{}",
        record.id, record.meeting_id
    );

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(record),
            message: Some("Created medical record successfully"),
        },
    ))
}

/// Fetch the medical records of a meeting. Only its patient or doctor may read them.
#[utoipa::path(
    get,
    path = "/meetings/{id}/records",
    tags = ["Medical Records"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Meeting ID whose records to fetch")
    ),
    responses(
        (status = 200, description = "List meeting records", body = StdResponse<Vec<MedicalRecordEntity>, String>)
    )
)]
async fn get_meeting_records(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let meeting: MeetingEntity = meetings::table.find(id).get_result(conn).await?;
    require_meeting_participant(&user, &meeting)?;

    let records: Vec<MedicalRecordEntity> = MedicalRecordEntity::belonging_to(&meeting)
        .order_by(medical_records::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get medical records")?;

    Ok(StdResponse {
        data: Some(records),
        message: Some("Get meeting records successfully"),
    })
}

/// Fetch all medical records in the system.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Medical Records"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all medical records", body = StdResponse<Vec<MedicalRecordEntity>, String>)
    )
)]
async fn get_medical_records(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let records: Vec<MedicalRecordEntity> = medical_records::table
        .order_by(medical_records::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get medical records")?;

    Ok(StdResponse {
        data: Some(records),
        message: Some("Get medical records successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct GetMedicalRecordRes {
    #[serde(flatten)]
    pub record: MedicalRecordEntity,
    pub medicines: Vec<MedicineEntity>,
}

/// Fetch a specific medical record with its prescribed medicines.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Medical Records"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medical record ID to fetch")
    ),
    responses(
        (status = 200, description = "Get medical record successfully", body = StdResponse<GetMedicalRecordRes, String>)
    )
)]
async fn get_medical_record(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let record: MedicalRecordEntity = medical_records::table.find(id).get_result(conn).await?;

    let medicines: Vec<MedicineEntity> = MedicineEntity::belonging_to(&record)
        .get_results(conn)
        .await
        .context("Failed to get medicines")?;

    Ok(StdResponse {
        data: Some(GetMedicalRecordRes { record, medicines }),
        message: Some("Get medical record successfully"),
    })
}

/// Rewrite a medical record's description. Only the owning doctor may do so.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Medical Records"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medical record ID to update")
    ),
    request_body = MedicalRecordReq,
    responses(
        (status = 200, description = "Updated medical record successfully", body = StdResponse<MedicalRecordEntity, String>)
    )
)]
async fn update_medical_record(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<MedicalRecordReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_record = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let doctor_id = record_doctor_id(conn, id).await?;
                require_owning_doctor(&user, doctor_id)?;

                let updated_record = diesel::update(medical_records::table.find(id))
                    .set(medical_records::description.eq(body.description))
                    .returning(MedicalRecordEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update medical record")?;

                Ok::<MedicalRecordEntity, AppError>(updated_record)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(updated_record),
        message: Some("Updated medical record successfully"),
    })
}

/// Delete a medical record and its medicines. Only the owning doctor may do so.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Medical Records"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medical record ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted medical record successfully", body = StdResponse<MedicalRecordEntity, String>)
    )
)]
async fn delete_medical_record(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted_record = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let doctor_id = record_doctor_id(conn, id).await?;
                require_owning_doctor(&user, doctor_id)?;

                let deleted_record = diesel::delete(medical_records::table.find(id))
                    .returning(MedicalRecordEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to delete medical record")?;

                Ok::<MedicalRecordEntity, AppError>(deleted_record)
            })
        })
        .await?;

    info!("Medical record #{} deleted", deleted_record.id);

    Ok(StdResponse {
        data: Some(deleted_record),
        message: Some("Medical record deleted successfully"),
    })
}
