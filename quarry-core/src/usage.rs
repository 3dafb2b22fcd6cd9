//! Per-user usage accounting and subscription gating.
//!
//! The store is injected into the controller rather than held globally. Each
//! user's record sits behind its own async mutex, so updates for one user
//! never wait on another.
//!
//! A run takes a [`UsageReservation`] up front: the quota check and the
//! daily count increment happen under one lock, so concurrent runs cannot
//! both slip under the limit. The reservation is committed on success and
//! released on failure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PolicyError;
use crate::policy::daily_task_limit;
use crate::types::Tier;

/// Mutable usage record for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUsage {
    pub tasks_today: u32,
    pub total_tasks: u64,
    /// Start of the current daily window.
    pub window_start: DateTime<Utc>,
    /// End of a premium subscription, when one was granted with a duration.
    pub premium_expires: Option<DateTime<Utc>>,
}

impl UserUsage {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            tasks_today: 0,
            total_tasks: 0,
            window_start: now,
            premium_expires: None,
        }
    }

    fn roll_window(&mut self, now: DateTime<Utc>) {
        if now - self.window_start >= Duration::days(1) {
            self.tasks_today = 0;
            self.window_start = now;
        }
    }
}

/// Snapshot returned alongside a research result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub tier: Tier,
    pub tasks_today: u32,
    /// `None` means unlimited.
    pub daily_limit: Option<u32>,
    pub remaining_today: Option<u32>,
    pub total_tasks: u64,
    pub subscription_active: bool,
    pub days_remaining: Option<i64>,
}

/// A daily slot held by an in-flight run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct UsageReservation {
    user_id: String,
    window_start: DateTime<Utc>,
}

impl UsageReservation {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Shared, per-user usage store.
#[derive(Debug, Default)]
pub struct UsageStore {
    users: Mutex<HashMap<String, Arc<Mutex<UserUsage>>>>,
}

impl UsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, user_id: &str, now: DateTime<Utc>) -> Arc<Mutex<UserUsage>> {
        let mut users = self.users.lock().await;
        Arc::clone(
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(UserUsage::new(now)))),
        )
    }

    /// Refuse the run if the user's quota or subscription does not allow it.
    pub async fn check_access(&self, user_id: &str, tier: Tier) -> Result<(), PolicyError> {
        self.check_access_at(user_id, tier, Utc::now()).await
    }

    pub async fn check_access_at(
        &self,
        user_id: &str,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        let entry = self.entry(user_id, now).await;
        let mut usage = entry.lock().await;
        admit(&mut usage, user_id, tier, now)
    }

    /// Check access and hold one of today's slots for the run.
    pub async fn reserve(
        &self,
        user_id: &str,
        tier: Tier,
    ) -> Result<UsageReservation, PolicyError> {
        self.reserve_at(user_id, tier, Utc::now()).await
    }

    pub async fn reserve_at(
        &self,
        user_id: &str,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<UsageReservation, PolicyError> {
        let entry = self.entry(user_id, now).await;
        let mut usage = entry.lock().await;
        admit(&mut usage, user_id, tier, now)?;
        usage.tasks_today += 1;
        debug!(user_id, tasks_today = usage.tasks_today, "Usage reserved");
        Ok(UsageReservation {
            user_id: user_id.to_string(),
            window_start: usage.window_start,
        })
    }

    /// Count a reserved run as completed.
    pub async fn commit(&self, reservation: UsageReservation) {
        let entry = self.entry(&reservation.user_id, Utc::now()).await;
        let mut usage = entry.lock().await;
        usage.total_tasks += 1;
        debug!(user_id = %reservation.user_id, total_tasks = usage.total_tasks, "Usage committed");
    }

    /// Give back a reserved slot. A slot from an earlier daily window is
    /// already gone and is not subtracted from the current one.
    pub async fn release(&self, reservation: UsageReservation) {
        let entry = self.entry(&reservation.user_id, Utc::now()).await;
        let mut usage = entry.lock().await;
        if usage.window_start == reservation.window_start {
            usage.tasks_today = usage.tasks_today.saturating_sub(1);
        }
        debug!(user_id = %reservation.user_id, tasks_today = usage.tasks_today, "Usage released");
    }

    /// Count one completed run against the user.
    pub async fn record_usage(&self, user_id: &str) {
        self.record_usage_at(user_id, Utc::now()).await;
    }

    pub async fn record_usage_at(&self, user_id: &str, now: DateTime<Utc>) {
        let entry = self.entry(user_id, now).await;
        let mut usage = entry.lock().await;
        usage.roll_window(now);
        usage.tasks_today += 1;
        usage.total_tasks += 1;
        debug!(user_id, tasks_today = usage.tasks_today, "Usage recorded");
    }

    /// Grant premium access for `days` from now.
    pub async fn upgrade_to_premium(&self, user_id: &str, days: i64) {
        let now = Utc::now();
        let entry = self.entry(user_id, now).await;
        entry.lock().await.premium_expires = Some(now + Duration::days(days));
    }

    /// Set or clear the premium expiry directly.
    pub async fn set_premium_expiry(&self, user_id: &str, expires: Option<DateTime<Utc>>) {
        let entry = self.entry(user_id, Utc::now()).await;
        entry.lock().await.premium_expires = expires;
    }

    pub async fn usage_stats(&self, user_id: &str, tier: Tier) -> UsageStats {
        self.usage_stats_at(user_id, tier, Utc::now()).await
    }

    pub async fn usage_stats_at(&self, user_id: &str, tier: Tier, now: DateTime<Utc>) -> UsageStats {
        let entry = self.entry(user_id, now).await;
        let mut usage = entry.lock().await;
        usage.roll_window(now);
        let daily_limit = daily_task_limit(tier);
        UsageStats {
            tier,
            tasks_today: usage.tasks_today,
            daily_limit,
            remaining_today: daily_limit.map(|limit| limit.saturating_sub(usage.tasks_today)),
            total_tasks: usage.total_tasks,
            subscription_active: usage.premium_expires.is_none_or(|expires| now <= expires),
            days_remaining: usage
                .premium_expires
                .map(|expires| (expires - now).num_days()),
        }
    }
}

fn admit(
    usage: &mut UserUsage,
    user_id: &str,
    tier: Tier,
    now: DateTime<Utc>,
) -> Result<(), PolicyError> {
    usage.roll_window(now);

    if tier.is_premium() {
        if let Some(expires) = usage.premium_expires {
            if now > expires {
                info!(user_id, %expires, "Premium subscription expired");
                return Err(PolicyError::SubscriptionExpired);
            }
        }
    }

    if let Some(limit) = daily_task_limit(tier) {
        if usage.tasks_today >= limit {
            info!(user_id, limit, "Daily task limit reached");
            return Err(PolicyError::QuotaExceeded { limit });
        }
    }
    Ok(())
}
