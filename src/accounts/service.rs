//! Account operations: status transitions, assignment, notes
//!
//! Every mutation locks the account row, applies the change, and appends
//! the matching Activity inside one transaction.

use crate::accounts::status::AccountStatus;
use crate::database::account_repository::{Account, AccountRepository};
use crate::database::activity_repository::{
    Activity, ActivityKind, ActivityRepository, Actor, NewActivity,
};
use crate::database::repository::TransactionalRepository;
use crate::error::{AppError, AppResult};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

pub struct AccountService {
    accounts: AccountRepository,
    activities: ActivityRepository,
}

impl AccountService {
    pub fn new(accounts: AccountRepository, activities: ActivityRepository) -> Self {
        Self {
            accounts,
            activities,
        }
    }

    /// Transition an account to a new status, enforcing the transition table
    pub async fn transition(
        &self,
        account_id: Uuid,
        new_status: AccountStatus,
        actor: &Actor,
        note: Option<&str>,
    ) -> AppResult<Account> {
        let mut tx = self.accounts.begin().await?;

        let account = self
            .accounts
            .find_by_id_for_update(tx.tx_mut(), account_id)
            .await?;
        let account = match account {
            Some(account) => account,
            None => {
                tx.rollback().await?;
                return Err(AppError::account_not_found(account_id.to_string()));
            }
        };

        // An unrecognized stored status has an empty allowed set, so any
        // requested transition is rejected with that context
        let allowed: &[AccountStatus] = AccountStatus::from_db_status(&account.status)
            .map(|status| status.allowed_transitions())
            .unwrap_or(&[]);

        if !allowed.contains(&new_status) {
            tx.rollback().await?;
            return Err(AppError::invalid_transition(
                account.status.clone(),
                new_status.to_db_status(),
                allowed
                    .iter()
                    .map(|status| status.to_db_status().to_string())
                    .collect(),
            ));
        }

        let updated = self
            .accounts
            .update_status_tx(tx.tx_mut(), account_id, new_status.to_db_status())
            .await?;

        let mut description = format!(
            "Status changed from {} to {}",
            account.status, new_status
        );
        if let Some(note) = note.filter(|n| !n.is_empty()) {
            description.push_str(&format!(" - {}", note));
        }

        self.activities
            .append_tx(
                tx.tx_mut(),
                &NewActivity {
                    account_id,
                    actor: actor.clone(),
                    kind: ActivityKind::StatusChange,
                    description,
                    metadata: json!({
                        "old_status": account.status,
                        "new_status": new_status.to_db_status(),
                    }),
                },
            )
            .await?;

        tx.commit().await?;

        info!(
            "Account {} transitioned from {} to {}",
            account_id, account.status, new_status
        );

        Ok(updated)
    }

    /// Assign an account to a collector. A new account also moves to
    /// assigned as part of the same transaction.
    pub async fn assign(
        &self,
        account_id: Uuid,
        collector_id: Uuid,
        collector_name: Option<&str>,
        actor: &Actor,
    ) -> AppResult<Account> {
        let mut tx = self.accounts.begin().await?;

        let account = self
            .accounts
            .find_by_id_for_update(tx.tx_mut(), account_id)
            .await?;
        let account = match account {
            Some(account) => account,
            None => {
                tx.rollback().await?;
                return Err(AppError::account_not_found(account_id.to_string()));
            }
        };

        let mut updated = self
            .accounts
            .assign_tx(tx.tx_mut(), account_id, collector_id)
            .await?;

        if AccountStatus::from_db_status(&account.status) == Some(AccountStatus::New) {
            updated = self
                .accounts
                .update_status_tx(
                    tx.tx_mut(),
                    account_id,
                    AccountStatus::Assigned.to_db_status(),
                )
                .await?;
        }

        let old_label = account
            .assigned_to
            .map(|id| id.to_string())
            .unwrap_or_else(|| "Unassigned".to_string());
        let new_label = collector_name
            .map(|name| name.to_string())
            .unwrap_or_else(|| collector_id.to_string());

        self.activities
            .append_tx(
                tx.tx_mut(),
                &NewActivity {
                    account_id,
                    actor: actor.clone(),
                    kind: ActivityKind::Assignment,
                    description: format!(
                        "Account reassigned from {} to {}",
                        old_label, new_label
                    ),
                    metadata: json!({
                        "old_collector_id": account.assigned_to,
                        "new_collector_id": collector_id,
                    }),
                },
            )
            .await?;

        tx.commit().await?;

        info!("Account {} assigned to collector {}", account_id, collector_id);

        Ok(updated)
    }

    /// Add a note to the account timeline, stamping last contact
    pub async fn add_note(
        &self,
        account_id: Uuid,
        text: &str,
        actor: &Actor,
    ) -> AppResult<Activity> {
        let mut tx = self.accounts.begin().await?;

        let account = self
            .accounts
            .find_by_id_for_update(tx.tx_mut(), account_id)
            .await?;
        if account.is_none() {
            tx.rollback().await?;
            return Err(AppError::account_not_found(account_id.to_string()));
        }

        self.accounts
            .touch_last_contact_tx(tx.tx_mut(), account_id)
            .await?;

        let activity = self
            .activities
            .append_tx(
                tx.tx_mut(),
                &NewActivity {
                    account_id,
                    actor: actor.clone(),
                    kind: ActivityKind::Note,
                    description: text.to_string(),
                    metadata: json!({}),
                },
            )
            .await?;

        tx.commit().await?;

        Ok(activity)
    }
}
