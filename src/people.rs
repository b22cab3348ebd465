//! Read-only view of the patient and practitioner tables owned by the rest of
//! the application.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::auth::{Identity, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Clone)]
pub struct Directory {
    db_pool: SqlitePool,
}

impl Directory {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Practitioner record id -> the practitioner's login identity id.
    pub async fn practitioner_identity(
        &self,
        practitioner_id: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM doctors WHERE id=?")
            .bind(practitioner_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    /// Login identity id -> practitioner record id, if that login is a practitioner.
    pub async fn practitioner_record(&self, user_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM doctors WHERE user_id=?")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn patient_profile(&self, patient_id: i64) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as("SELECT full_name AS name, avatar FROM users WHERE id=?")
            .bind(patient_id)
            .fetch_optional(&self.db_pool)
            .await
    }

    pub async fn practitioner_profile(
        &self,
        practitioner_id: i64,
    ) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as(
            "SELECT u.full_name AS name, u.avatar
             FROM doctors d JOIN users u ON u.id = d.user_id
             WHERE d.id=?",
        )
        .bind(practitioner_id)
        .fetch_optional(&self.db_pool)
        .await
    }

    /// The id this identity appears under in `chat_rooms`: the user id for a
    /// patient, the practitioner record id for a practitioner.
    pub async fn room_side_id(&self, identity: Identity) -> Result<Option<i64>, sqlx::Error> {
        match identity.role {
            Role::Patient => Ok(Some(identity.id)),
            Role::Practitioner => self.practitioner_record(identity.id).await,
        }
    }
}
