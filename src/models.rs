use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Associations, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::app_error::AppError;

// Roles

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            other => Err(anyhow::anyhow!("Unknown role {:?}", other)),
        }
    }
}

// Users

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub hashed_password: String,
    pub role: String,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub hashed_password: String,
    pub role: String,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct UpdateUserEntity {
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub hashed_password: Option<String>,
}

/// Public view of a user. Never exposes the password hash.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct UserRes {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub role: String,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserEntity> for UserRes {
    fn from(user: UserEntity) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            surname: user.surname,
            role: user.role,
            is_confirmed: user.is_confirmed,
            created_at: user.created_at,
        }
    }
}

// Meetings

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum MeetingStatus {
    Pending,
    Confirmed,
    Reject,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Pending => "Pending",
            MeetingStatus::Confirmed => "Confirmed",
            MeetingStatus::Reject => "Reject",
        }
    }

    /// Maps a doctor's decision code onto the status it produces.
    pub fn from_decision_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MeetingStatus::Reject),
            2 => Some(MeetingStatus::Confirmed),
            _ => None,
        }
    }

    /// Only pending meetings can be decided, and only into a final status.
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        matches!(
            (self, next),
            (
                MeetingStatus::Pending,
                MeetingStatus::Confirmed | MeetingStatus::Reject
            )
        )
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(MeetingStatus::Pending),
            "Confirmed" => Ok(MeetingStatus::Confirmed),
            "Reject" => Ok(MeetingStatus::Reject),
            other => Err(anyhow::anyhow!("Unknown meeting status {:?}", other)),
        }
    }
}

/// A doctor's answer to a meeting request, either as a numeric code
/// (`1` rejects, `2` confirms) or as the status name.
#[derive(Deserialize, Debug, Clone, ToSchema)]
#[serde(untagged)]
pub enum MeetingDecision {
    Code(i32),
    Name(String),
}

impl MeetingDecision {
    pub fn into_status(self) -> Result<MeetingStatus, AppError> {
        let status = match &self {
            MeetingDecision::Code(code) => MeetingStatus::from_decision_code(*code),
            MeetingDecision::Name(name) => name.parse::<MeetingStatus>().ok(),
        };
        match status {
            Some(status) if status != MeetingStatus::Pending => Ok(status),
            _ => Err(AppError::BadRequest(format!(
                "{} is not a valid meeting decision",
                self
            ))),
        }
    }
}

impl fmt::Display for MeetingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeetingDecision::Code(code) => write!(f, "{}", code),
            MeetingDecision::Name(name) => write!(f, "{:?}", name),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::meetings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MeetingEntity {
    pub id: i32,
    pub patient_id: i32,
    pub doctor_id: i32,
    pub scheduled_date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::meetings)]
pub struct CreateMeetingEntity {
    pub patient_id: i32,
    pub doctor_id: i32,
    pub scheduled_date: DateTime<Utc>,
    pub status: String,
}

// Medical records

#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone, ToSchema,
)]
#[diesel(belongs_to(MeetingEntity, foreign_key = meeting_id))]
#[diesel(table_name = crate::schema::medical_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MedicalRecordEntity {
    pub id: i32,
    pub meeting_id: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::medical_records)]
pub struct CreateMedicalRecordEntity {
    pub meeting_id: i32,
    pub description: String,
}

// Medicines

#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone, ToSchema,
)]
#[diesel(belongs_to(MedicalRecordEntity, foreign_key = medical_record_id))]
#[diesel(table_name = crate::schema::medicines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MedicineEntity {
    pub id: i32,
    pub name: String,
    pub dosage: f32,
    pub frequency: String,
    pub medical_record_id: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::medicines)]
pub struct CreateMedicineEntity {
    pub name: String,
    pub dosage: f32,
    pub frequency: String,
    pub medical_record_id: i32,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::medicines)]
pub struct UpdateMedicineEntity {
    pub name: Option<String>,
    pub dosage: Option<f32>,
    pub frequency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_their_column_value() {
        for role in [Role::Admin, Role::Doctor, Role::Patient] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Doctor).unwrap(), "\"doctor\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn decision_codes_map_to_statuses() {
        assert_eq!(
            MeetingStatus::from_decision_code(1),
            Some(MeetingStatus::Reject)
        );
        assert_eq!(
            MeetingStatus::from_decision_code(2),
            Some(MeetingStatus::Confirmed)
        );
        assert_eq!(MeetingStatus::from_decision_code(0), None);
        assert_eq!(MeetingStatus::from_decision_code(3), None);
    }

    #[test]
    fn confirmed_status_is_stored_verbatim() {
        assert_eq!(MeetingStatus::Confirmed.as_str(), "Confirmed");
        assert_eq!(MeetingStatus::Reject.as_str(), "Reject");
        assert_eq!(MeetingStatus::Pending.to_string(), "Pending");
    }

    #[test]
    fn only_pending_meetings_transition() {
        use MeetingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Reject));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Reject));
        assert!(!Reject.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn decisions_accept_codes_and_names() {
        let code: MeetingDecision = serde_json::from_str("2").unwrap();
        assert_eq!(code.into_status().unwrap(), MeetingStatus::Confirmed);

        let code: MeetingDecision = serde_json::from_str("1").unwrap();
        assert_eq!(code.into_status().unwrap(), MeetingStatus::Reject);

        let name: MeetingDecision = serde_json::from_str("\"Reject\"").unwrap();
        assert_eq!(name.into_status().unwrap(), MeetingStatus::Reject);
    }

    #[test]
    fn unknown_decisions_are_invalid_arguments() {
        for raw in ["0", "3", "-1", "\"Pending\"", "\"confirmed\"", "\"Maybe\""] {
            let decision: MeetingDecision = serde_json::from_str(raw).unwrap();
            assert!(
                matches!(decision.into_status(), Err(AppError::BadRequest(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn user_view_drops_password_hash() {
        let now = Utc::now();
        let res = UserRes::from(UserEntity {
            id: 7,
            username: "house".into(),
            email: "house@medbook.test".into(),
            name: "Gregory".into(),
            surname: "House".into(),
            hashed_password: "$2b$12$secret".into(),
            role: "doctor".into(),
            is_confirmed: false,
            created_at: now,
            updated_at: now,
        });
        let json = serde_json::to_value(&res).unwrap();
        assert!(json.get("hashed_password").is_none());
        assert_eq!(json["role"], "doctor");
    }
}
