use crate::accounts::status::AgingBucket;
use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::{Repository, TransactionalRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::Transaction as SqlxTransaction;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

/// Account entity: a debtor's delinquent balance under one agency
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub debtor_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub external_ref: String,
    pub original_amount: Decimal,
    pub current_balance: Decimal,
    pub status: String,
    pub priority: i32,
    pub due_date: Option<NaiveDate>,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Days elapsed since the due date; zero when no due date is set or the
    /// account is not yet due
    pub fn days_past_due(&self, as_of: NaiveDate) -> i64 {
        match self.due_date {
            Some(due) => (as_of - due).num_days().max(0),
            None => 0,
        }
    }

    pub fn aging_bucket(&self, as_of: NaiveDate) -> AgingBucket {
        AgingBucket::from_days_past_due(self.days_past_due(as_of))
    }
}

/// Fields required to create an account from an import row
#[derive(Debug, Clone)]
pub struct NewAccountRecord {
    pub agency_id: Uuid,
    pub debtor_id: Uuid,
    pub external_ref: String,
    pub original_amount: Decimal,
    pub due_date: Option<NaiveDate>,
}

/// Repository for account rows
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock an account row for the remainder of the transaction. Balance
    /// read-modify-write must go through this.
    pub async fn find_by_id_for_update(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
    ) -> DbResult<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at
             FROM accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Find an account by its unique external reference
    pub async fn find_by_external_ref_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        external_ref: &str,
    ) -> DbResult<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at
             FROM accounts WHERE external_ref = $1",
        )
        .bind(external_ref)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Insert a freshly imported account. Balance starts at the original
    /// amount and status at 'new'.
    pub async fn insert_imported_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        record: &NewAccountRecord,
    ) -> DbResult<Account> {
        sqlx::query_as::<_, Account>(
            "INSERT INTO accounts (agency_id, debtor_id, external_ref, original_amount, current_balance, status, priority, due_date)
             VALUES ($1, $2, $3, $4, $4, 'new', 0, $5)
             RETURNING id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at",
        )
        .bind(record.agency_id)
        .bind(record.debtor_id)
        .bind(&record.external_ref)
        .bind(record.original_amount)
        .bind(record.due_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Refresh an existing account from a re-imported row: amounts and due
    /// date are overwritten, status and assignment are left alone
    pub async fn refresh_imported_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        record: &NewAccountRecord,
    ) -> DbResult<Account> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts
             SET agency_id = $2, debtor_id = $3, original_amount = $4, current_balance = $4, due_date = $5, updated_at = now()
             WHERE id = $1
             RETURNING id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at",
        )
        .bind(id)
        .bind(record.agency_id)
        .bind(record.debtor_id)
        .bind(record.original_amount)
        .bind(record.due_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Set the current balance on a locked account row
    pub async fn update_balance_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        new_balance: Decimal,
    ) -> DbResult<Account> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET current_balance = $2, updated_at = now()
             WHERE id = $1
             RETURNING id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at",
        )
        .bind(id)
        .bind(new_balance)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Set the account status
    pub async fn update_status_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        status: &str,
    ) -> DbResult<Account> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET status = $2, updated_at = now()
             WHERE id = $1
             RETURNING id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at",
        )
        .bind(id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Set the assigned collector
    pub async fn assign_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        collector_id: Uuid,
    ) -> DbResult<Account> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET assigned_to = $2, updated_at = now()
             WHERE id = $1
             RETURNING id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at",
        )
        .bind(id)
        .bind(collector_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Stamp the last contact timestamp
    pub async fn touch_last_contact_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
    ) -> DbResult<Account> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET last_contact_at = now(), updated_at = now()
             WHERE id = $1
             RETURNING id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at",
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl Repository for AccountRepository {
    type Entity = Account;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        sqlx::query_as::<_, Account>(
            "SELECT id, agency_id, debtor_id, assigned_to, external_ref, original_amount, current_balance, status, priority, due_date, last_contact_at, created_at, updated_at
             FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

impl TransactionalRepository for AccountRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::status::AgingBucket;
    use rust_decimal_macros::dec;

    fn account_due(due_date: Option<NaiveDate>) -> Account {
        Account {
            id: Uuid::new_v4(),
            agency_id: Uuid::new_v4(),
            debtor_id: Uuid::new_v4(),
            assigned_to: None,
            external_ref: "ACC-1".to_string(),
            original_amount: dec!(1000.00),
            current_balance: dec!(1000.00),
            status: "new".to_string(),
            priority: 0,
            due_date,
            last_contact_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_past_due_counts_from_due_date() {
        let account = account_due(Some(date(2024, 1, 1)));
        assert_eq!(account.days_past_due(date(2024, 1, 1)), 0);
        assert_eq!(account.days_past_due(date(2024, 1, 31)), 30);
        assert_eq!(account.days_past_due(date(2024, 3, 1)), 60);
    }

    #[test]
    fn test_not_yet_due_clamps_to_zero() {
        let account = account_due(Some(date(2024, 6, 1)));
        assert_eq!(account.days_past_due(date(2024, 5, 1)), 0);
        assert_eq!(
            account.aging_bucket(date(2024, 5, 1)),
            AgingBucket::Days0To30
        );
    }

    #[test]
    fn test_no_due_date_stays_current() {
        let account = account_due(None);
        assert_eq!(account.days_past_due(date(2030, 1, 1)), 0);
        assert_eq!(
            account.aging_bucket(date(2030, 1, 1)),
            AgingBucket::Days0To30
        );
    }

    #[test]
    fn test_aging_buckets_by_age() {
        let account = account_due(Some(date(2024, 1, 1)));
        assert_eq!(
            account.aging_bucket(date(2024, 2, 15)),
            AgingBucket::Days31To60
        );
        assert_eq!(
            account.aging_bucket(date(2024, 3, 15)),
            AgingBucket::Days61To90
        );
        assert_eq!(account.aging_bucket(date(2024, 6, 1)), AgingBucket::Over90);
    }
}
