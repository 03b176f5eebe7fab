use anyhow::Context;

use crate::{
    app_error::AppError,
    models::{MeetingEntity, Role, UserEntity},
};

/// The authenticated caller, resolved from the bearer token by the
/// authentication middleware and handed to handlers as an `Extension`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub is_confirmed: bool,
}

impl TryFrom<UserEntity> for CurrentUser {
    type Error = AppError;

    fn try_from(user: UserEntity) -> Result<Self, Self::Error> {
        let role = user
            .role
            .parse::<Role>()
            .with_context(|| format!("User #{} has a corrupt role", user.id))?;
        Ok(Self {
            id: user.id,
            username: user.username,
            name: user.name,
            role,
            is_confirmed: user.is_confirmed,
        })
    }
}

/// The single capability check. Doctors only hold the doctor capability once
/// an admin has confirmed their account.
pub fn require_role(user: &CurrentUser, required: Role) -> Result<(), AppError> {
    if user.role != required {
        return Err(AppError::ForbiddenResource(format!(
            "This action requires the {} role",
            required
        )));
    }
    if required == Role::Doctor && !user.is_confirmed {
        return Err(AppError::ForbiddenResource(
            "Doctor account has not been confirmed by an admin".into(),
        ));
    }
    Ok(())
}

pub fn require_self_or_admin(user: &CurrentUser, user_id: i32) -> Result<(), AppError> {
    if user.id == user_id || user.role == Role::Admin {
        return Ok(());
    }
    Err(AppError::ForbiddenResource(
        "You can only manage your own account".into(),
    ))
}

/// Caller must be the confirmed doctor named on the meeting. Also used for the
/// records and medicines hanging off it, passing the meeting's `doctor_id`.
pub fn require_owning_doctor(user: &CurrentUser, doctor_id: i32) -> Result<(), AppError> {
    require_role(user, Role::Doctor)?;
    if user.id != doctor_id {
        return Err(AppError::ForbiddenResource(
            "Only the doctor of this meeting can do this".into(),
        ));
    }
    Ok(())
}

pub fn require_meeting_participant(
    user: &CurrentUser,
    meeting: &MeetingEntity,
) -> Result<(), AppError> {
    if user.id == meeting.patient_id || user.id == meeting.doctor_id {
        return Ok(());
    }
    Err(AppError::ForbiddenResource(
        "You are not a participant of this meeting".into(),
    ))
}
