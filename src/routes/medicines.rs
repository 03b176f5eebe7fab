use anyhow::Context;
use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::{AppJson, AppPath},
    auth::{CurrentUser, policy::require_owning_doctor},
    middleware,
    models::{CreateMedicineEntity, MedicalRecordEntity, MedicineEntity, UpdateMedicineEntity},
    routes::medical_records::record_doctor_id,
    schema::{medical_records, medicines, meetings},
};

/// Prescription routes. Writes always resolve medicine → record → meeting → doctor.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(add_medicine))
        .routes(utoipa_axum::routes!(get_record_medicines))
        .nest(
            "/medicines",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_medicine))
                .routes(utoipa_axum::routes!(update_medicine))
                .routes(utoipa_axum::routes!(delete_medicine)),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authentication,
        ))
}

async fn medicine_doctor_id(
    conn: &mut AsyncPgConnection,
    medicine_id: i32,
) -> Result<i32, AppError> {
    let doctor_id = medicines::table
        .inner_join(medical_records::table.inner_join(meetings::table))
        .filter(medicines::id.eq(medicine_id))
        .select(meetings::doctor_id)
        .get_result::<i32>(conn)
        .await?;
    Ok(doctor_id)
}

fn validate_prescription(
    name: Option<&str>,
    dosage: Option<f32>,
    frequency: Option<&str>,
) -> Result<(), AppError> {
    if name.is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::BadRequest("Medicine name must not be empty".into()));
    }
    if dosage.is_some_and(|dosage| !dosage.is_finite() || dosage <= 0.0) {
        return Err(AppError::BadRequest("Dosage must be a positive number".into()));
    }
    if frequency.is_some_and(|frequency| frequency.trim().is_empty()) {
        return Err(AppError::BadRequest("Frequency must not be empty".into()));
    }
    Ok(())
}

#[derive(Deserialize, ToSchema)]
pub struct AddMedicineReq {
    pub name: String,
    pub dosage: f32,
    pub frequency: String,
}

/// Prescribe a medicine on a medical record. Only the doctor of the record's meeting may do so.
#[utoipa::path(
    post,
    path = "/medical_records/{id}/medicines",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medical record ID to prescribe on")
    ),
    request_body = AddMedicineReq,
    responses(
        (status = 201, description = "Added medicine successfully", body = StdResponse<MedicineEntity, String>),
        (status = 403, description = "Caller does not own the parent meeting"),
        (status = 404, description = "Medical record not found")
    )
)]
async fn add_medicine(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<AddMedicineReq>,
) -> Result<impl IntoResponse, AppError> {
    validate_prescription(Some(&body.name), Some(body.dosage), Some(&body.frequency))?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let doctor_id = record_doctor_id(conn, id).await?;
                require_owning_doctor(&user, doctor_id)?;

                let medicine = diesel::insert_into(medicines::table)
                    .values(CreateMedicineEntity {
                        name: body.name,
                        dosage: body.dosage,
                        frequency: body.frequency,
                        medical_record_id: id,
                    })
                    .returning(MedicineEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create medicine")?;

                Ok::<MedicineEntity, AppError>(medicine)
            })
        })
        .await?;

    info!(
        "Medicine #{} prescribed on medical record #{}",
        medicine.id, medicine.medical_record_id
    );

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(medicine),
            message: Some("Added medicine successfully"),
        },
    ))
}

/// Fetch the medicines prescribed on a medical record.
#[utoipa::path(
    get,
    path = "/medical_records/{id}/medicines",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medical record ID whose medicines to fetch")
    ),
    responses(
        (status = 200, description = "List record medicines", body = StdResponse<Vec<MedicineEntity>, String>)
    )
)]
async fn get_record_medicines(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let record: MedicalRecordEntity = medical_records::table.find(id).get_result(conn).await?;

    let medicines: Vec<MedicineEntity> = medicines::table
        .filter(medicines::medical_record_id.eq(record.id))
        .order_by(medicines::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get medicines")?;

    Ok(StdResponse {
        data: Some(medicines),
        message: Some("Get medicines successfully"),
    })
}

/// Fetch a specific medicine.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medicine ID to fetch")
    ),
    responses(
        (status = 200, description = "Get medicine successfully", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn get_medicine(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine: MedicineEntity = medicines::table.find(id).get_result(conn).await?;

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Get medicine successfully"),
    })
}

/// Change a prescription. Only the doctor of the parent meeting may do so.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medicine ID to update")
    ),
    request_body = UpdateMedicineEntity,
    responses(
        (status = 200, description = "Updated medicine successfully", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn update_medicine(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    AppJson(body): AppJson<UpdateMedicineEntity>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.is_none() && body.dosage.is_none() && body.frequency.is_none() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }
    validate_prescription(body.name.as_deref(), body.dosage, body.frequency.as_deref())?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_medicine = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let doctor_id = medicine_doctor_id(conn, id).await?;
                require_owning_doctor(&user, doctor_id)?;

                let updated_medicine = diesel::update(medicines::table.find(id))
                    .set(&body)
                    .returning(MedicineEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update medicine")?;

                Ok::<MedicineEntity, AppError>(updated_medicine)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(updated_medicine),
        message: Some("Updated medicine successfully"),
    })
}

/// Remove a prescription. Only the doctor of the parent meeting may do so.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Medicine ID to delete")
    ),
    responses(
        (status = 200, description = "Deleted medicine successfully", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn delete_medicine(
    AppPath(id): AppPath<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted_medicine = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let doctor_id = medicine_doctor_id(conn, id).await?;
                require_owning_doctor(&user, doctor_id)?;

                let deleted_medicine = diesel::delete(medicines::table.find(id))
                    .returning(MedicineEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to delete medicine")?;

                Ok::<MedicineEntity, AppError>(deleted_medicine)
            })
        })
        .await?;

    info!("Medicine #{} deleted", deleted_medicine.id);

    Ok(StdResponse {
        data: Some(deleted_medicine),
        message: Some("Medicine deleted successfully"),
    })
}
