use crate::database::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Transaction as SqlxTransaction;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::database::repository::Repository;

/// Debtor entity: the person or business owing the account balance
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Debtor {
    pub id: Uuid,
    pub external_ref: String,
    pub full_name: String,
    pub ssn_last4: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub created_at: DateTime<Utc>,
}

/// Contact fields carried by an import row
#[derive(Debug, Clone)]
pub struct NewDebtorRecord {
    pub external_ref: String,
    pub full_name: String,
    pub ssn_last4: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Repository for debtor rows
pub struct DebtorRepository {
    pool: PgPool,
}

impl DebtorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a debtor by its unique external reference
    pub async fn find_by_external_ref_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        external_ref: &str,
    ) -> DbResult<Option<Debtor>> {
        sqlx::query_as::<_, Debtor>(
            "SELECT id, external_ref, full_name, ssn_last4, email, phone, address_line1, city, state, zip, created_at
             FROM debtors WHERE external_ref = $1",
        )
        .bind(external_ref)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Insert a debtor from an import row. Address fields start empty and
    /// are filled in by later enrichment.
    pub async fn insert_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        record: &NewDebtorRecord,
    ) -> DbResult<Debtor> {
        sqlx::query_as::<_, Debtor>(
            "INSERT INTO debtors (external_ref, full_name, ssn_last4, email, phone, address_line1, city, state, zip)
             VALUES ($1, $2, $3, $4, $5, '', '', '', '')
             RETURNING id, external_ref, full_name, ssn_last4, email, phone, address_line1, city, state, zip, created_at",
        )
        .bind(&record.external_ref)
        .bind(&record.full_name)
        .bind(&record.ssn_last4)
        .bind(&record.email)
        .bind(&record.phone)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Refresh contact fields from a re-imported row
    pub async fn update_contact_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        record: &NewDebtorRecord,
    ) -> DbResult<Debtor> {
        sqlx::query_as::<_, Debtor>(
            "UPDATE debtors SET full_name = $2, ssn_last4 = $3, email = $4, phone = $5
             WHERE id = $1
             RETURNING id, external_ref, full_name, ssn_last4, email, phone, address_line1, city, state, zip, created_at",
        )
        .bind(id)
        .bind(&record.full_name)
        .bind(&record.ssn_last4)
        .bind(&record.email)
        .bind(&record.phone)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl Repository for DebtorRepository {
    type Entity = Debtor;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        sqlx::query_as::<_, Debtor>(
            "SELECT id, external_ref, full_name, ssn_last4, email, phone, address_line1, city, state, zip, created_at
             FROM debtors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
