use std::sync::Arc;

use aqd_core::{
    Account, AccountStore, Actor, Catalog, NewPlanPayment, Plan, PlanPayment, Result,
    ServiceError, SubscriptionStatus,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Status of an account at `now`. The trial always wins while it lasts;
/// after it, any payment period covering `now` makes the account active.
pub fn subscription_status(
    account: &Account,
    payments: &[PlanPayment],
    trial_days: i64,
    now: DateTime<Utc>,
) -> SubscriptionStatus {
    if now < trial_end(account, trial_days) {
        SubscriptionStatus::Trialing
    } else if covering_payment(payments, now).is_some() {
        SubscriptionStatus::Active
    } else {
        SubscriptionStatus::Expired
    }
}

/// End of the trial. Saturates instead of overflowing for catalogs built
/// without validation.
pub fn trial_end(account: &Account, trial_days: i64) -> DateTime<Utc> {
    Duration::try_days(trial_days)
        .and_then(|length| account.trial_start.checked_add_signed(length))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn covering_payment(payments: &[PlanPayment], now: DateTime<Utc>) -> Option<&PlanPayment> {
    payments.iter().rev().find(|payment| payment.covers(now))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionSnapshot {
    pub account_id: Uuid,
    pub user_id: Uuid,
    /// Plan whose features currently apply.
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub trial_ends_at: DateTime<Utc>,
    pub paid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureGrant {
    pub account_id: Uuid,
    pub feature: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
}

/// Trial and subscription bookkeeping against the shared plan catalog.
#[derive(Clone)]
pub struct SubscriptionService {
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<Catalog>,
}

impl SubscriptionService {
    pub fn new(accounts: Arc<dyn AccountStore>, catalog: Arc<Catalog>) -> Self {
        Self { accounts, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn get_status(&self, account_id: Uuid) -> Result<SubscriptionSnapshot> {
        self.get_status_at(account_id, Utc::now()).await
    }

    pub async fn get_status_at(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionSnapshot> {
        let account = self.load(account_id).await?;
        let payments = self.accounts.payments_for_account(account_id).await?;
        Ok(self.snapshot(&account, &payments, now))
    }

    pub async fn ensure_account(&self, user_id: Uuid) -> Result<Account> {
        let now = Utc::now();
        let candidate = Account {
            id: Uuid::new_v4(),
            user_id,
            plan_id: self.catalog.default_plan.clone(),
            trial_start: now,
            created_at: now,
        };

        let stored = self.accounts.insert_account_if_absent(&candidate).await?;
        if stored.id == candidate.id {
            info!(account_id = %stored.id, user_id = %user_id, plan_id = %stored.plan_id, "account created");
        }
        Ok(stored)
    }

    pub async fn record_payment(
        &self,
        account_id: Uuid,
        input: NewPlanPayment,
        actor: &Actor,
    ) -> Result<PlanPayment> {
        if !actor.is_admin() {
            return Err(ServiceError::unauthorized(
                "only administrators may record subscription payments",
            ));
        }

        let mut missing = Vec::new();
        let plan_id = input
            .plan_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let method = input
            .method
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if plan_id.is_none() {
            missing.push("plan_id");
        }
        if method.is_none() {
            missing.push("method");
        }
        let (Some(plan_id), Some(method)) = (plan_id, method) else {
            return Err(ServiceError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        };

        let plan = self
            .catalog
            .plan(plan_id)
            .ok_or_else(|| ServiceError::validation(format!("unknown plan {plan_id}")))?;
        let method = method.to_ascii_lowercase();
        if !self.catalog.accepts_payment_method(&method) {
            return Err(ServiceError::validation(format!(
                "unsupported payment method {method}"
            )));
        }
        let amount = input.amount.unwrap_or(plan.price);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::validation("amount must be greater than zero"));
        }

        let length = Duration::try_days(plan.period_days).ok_or_else(|| {
            ServiceError::validation(format!("plan {} has an out-of-range period", plan.id))
        })?;

        self.load(account_id).await?;
        let now = Utc::now();
        let candidate = PlanPayment {
            id: Uuid::new_v4(),
            account_id,
            plan_id: plan.id.clone(),
            method,
            amount: amount.round_dp(4),
            period_start: now,
            period_end: now,
            recorded_by: actor.user_id,
            recorded_at: now,
        };
        let payment = self
            .accounts
            .extend_subscription(candidate, length)
            .await?;

        info!(
            account_id = %account_id,
            plan_id = %payment.plan_id,
            period_end = %payment.period_end,
            recorded_by = %actor.user_id,
            "subscription payment recorded"
        );
        Ok(payment)
    }

    pub async fn authorize_feature(&self, account_id: Uuid, feature: &str) -> Result<FeatureGrant> {
        let snapshot = self.get_status(account_id).await?;
        if snapshot.status == SubscriptionStatus::Expired {
            return Err(ServiceError::unauthorized(
                "subscription has expired; renew a plan to continue",
            ));
        }

        let plan = self.plan(&snapshot.plan_id)?;
        if !plan.includes(feature) {
            return Err(ServiceError::unauthorized(format!(
                "feature {feature} is not included in plan {}",
                plan.id
            )));
        }

        Ok(FeatureGrant {
            account_id,
            feature: feature.to_string(),
            plan_id: plan.id.clone(),
            status: snapshot.status,
        })
    }

    fn snapshot(
        &self,
        account: &Account,
        payments: &[PlanPayment],
        now: DateTime<Utc>,
    ) -> SubscriptionSnapshot {
        let status = subscription_status(account, payments, self.catalog.trial_days, now);
        let plan_id = match status {
            SubscriptionStatus::Active => covering_payment(payments, now)
                .map(|payment| payment.plan_id.clone())
                .unwrap_or_else(|| account.plan_id.clone()),
            _ => account.plan_id.clone(),
        };

        SubscriptionSnapshot {
            account_id: account.id,
            user_id: account.user_id,
            plan_id,
            status,
            trial_ends_at: trial_end(account, self.catalog.trial_days),
            paid_until: payments.iter().map(|payment| payment.period_end).max(),
        }
    }

    fn plan(&self, id: &str) -> Result<&Plan> {
        self.catalog
            .plan(id)
            .ok_or_else(|| ServiceError::validation(format!("plan {id} is no longer offered")))
    }

    async fn load(&self, account_id: Uuid) -> Result<Account> {
        self.accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqd_core::{AccountStore, Role};
    use aqd_store::InMemoryStore;

    fn service() -> (Arc<InMemoryStore>, SubscriptionService) {
        let store = Arc::new(InMemoryStore::new());
        let service = SubscriptionService::new(store.clone(), Arc::new(Catalog::default()));
        (store, service)
    }

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    fn payment(plan_id: &str, method: &str) -> NewPlanPayment {
        NewPlanPayment {
            plan_id: Some(plan_id.to_string()),
            method: Some(method.to_string()),
            amount: None,
        }
    }

    #[test]
    fn trial_boundary_is_exclusive() {
        let start = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: "basic".to_string(),
            trial_start: start,
            created_at: start,
        };

        assert_eq!(
            subscription_status(&account, &[], 14, start + Duration::days(14) - Duration::seconds(1)),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            subscription_status(&account, &[], 14, start + Duration::days(14)),
            SubscriptionStatus::Expired
        );
    }

    #[tokio::test]
    async fn trial_runs_fourteen_days() {
        let (_, service) = service();
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();

        let day_13 = service
            .get_status_at(account.id, account.trial_start + Duration::days(13))
            .await
            .unwrap();
        let day_15 = service
            .get_status_at(account.id, account.trial_start + Duration::days(15))
            .await
            .unwrap();

        assert_eq!(day_13.status, SubscriptionStatus::Trialing);
        assert_eq!(day_15.status, SubscriptionStatus::Expired);
        assert_eq!(day_15.trial_ends_at, account.trial_start + Duration::days(14));
        assert_eq!(day_15.paid_until, None);
    }

    #[tokio::test]
    async fn ensure_account_is_idempotent() {
        let (store, service) = service();
        let user = Uuid::new_v4();

        let first = service.ensure_account(user).await.unwrap();
        let second = service.ensure_account(user).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.plan_id, "basic");
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let (_, service) = service();
        let err = service.get_status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "account", .. }));
    }

    #[tokio::test]
    async fn payments_extend_after_trial() {
        let (_, service) = service();
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();

        let first = service
            .record_payment(account.id, payment("pro", "STC_PAY"), &admin())
            .await
            .unwrap();
        assert_eq!(first.method, "stc_pay");
        assert_eq!(first.amount, Decimal::new(249, 0));
        assert_eq!(first.period_end - first.period_start, Duration::days(30));

        let second = service
            .record_payment(account.id, payment("pro", "cash"), &admin())
            .await
            .unwrap();
        assert_eq!(second.period_start, first.period_end);

        let day_20 = service
            .get_status_at(account.id, account.trial_start + Duration::days(20))
            .await
            .unwrap();
        assert_eq!(day_20.status, SubscriptionStatus::Active);
        assert_eq!(day_20.plan_id, "pro");
        assert_eq!(day_20.paid_until, Some(second.period_end));
    }

    #[tokio::test]
    async fn payment_requires_admin_and_known_plan() {
        let (_, service) = service();
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();
        let client = Actor::new(account.user_id, Role::Client);

        let err = service
            .record_payment(account.id, payment("basic", "cash"), &client)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        let err = service
            .record_payment(account.id, payment("gold", "cash"), &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .record_payment(account.id, NewPlanPayment::default(), &admin())
            .await
            .unwrap_err();
        let ServiceError::Validation(message) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(message.contains("plan_id") && message.contains("method"));
    }

    #[tokio::test]
    async fn trial_grants_default_plan_features() {
        let (_, service) = service();
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();

        let grant = service
            .authorize_feature(account.id, "contracts")
            .await
            .unwrap();
        assert_eq!(grant.status, SubscriptionStatus::Trialing);
        assert_eq!(grant.plan_id, "basic");

        let err = service
            .authorize_feature(account.id, "reports")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));
    }

    #[tokio::test]
    async fn expired_account_is_denied_everything() {
        let (store, service) = service();
        let started = Utc::now() - Duration::days(40);
        let account = store
            .insert_account_if_absent(&Account {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                plan_id: "enterprise".to_string(),
                trial_start: started,
                created_at: started,
            })
            .await
            .unwrap();

        let err = service
            .authorize_feature(account.id, "contracts")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        service
            .record_payment(account.id, payment("basic", "bank_transfer"), &admin())
            .await
            .unwrap();
        let grant = service
            .authorize_feature(account.id, "contracts")
            .await
            .unwrap();
        assert_eq!(grant.status, SubscriptionStatus::Active);
        assert_eq!(grant.plan_id, "basic");
        assert!(service.authorize_feature(account.id, "affiliates").await.is_err());
    }

    #[tokio::test]
    async fn oversized_trial_saturates_instead_of_panicking() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Catalog {
            trial_days: 1_000_000_000_000,
            ..Catalog::default()
        };
        let service = SubscriptionService::new(store, Arc::new(catalog));
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();

        let snapshot = service.get_status(account.id).await.unwrap();
        assert_eq!(snapshot.status, SubscriptionStatus::Trialing);
        assert_eq!(snapshot.trial_ends_at, DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn oversized_plan_period_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = Catalog::default();
        catalog.plans[0].period_days = i64::MAX;
        let plan_id = catalog.plans[0].id.clone();
        let service = SubscriptionService::new(store, Arc::new(catalog));
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();

        let err = service
            .record_payment(account.id, payment(&plan_id, "cash"), &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_payments_do_not_overlap() {
        let (_, service) = service();
        let account = service.ensure_account(Uuid::new_v4()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let account_id = account.id;
            handles.push(tokio::spawn(async move {
                service
                    .record_payment(account_id, payment("basic", "cash"), &admin())
                    .await
            }));
        }

        let mut periods = Vec::new();
        for handle in handles {
            let payment = handle.await.unwrap().unwrap();
            periods.push((payment.period_start, payment.period_end));
        }
        periods.sort();
        for pair in periods.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }
}
