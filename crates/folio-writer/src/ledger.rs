//! The usage ledger service: every generation path charges words here.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use folio_core::ledger::{
  Charge, CreditGrant, NewCreditGrant, Profile, UsageSummary, WordLimit, month_key,
  months_before, plan_charge,
};
use folio_core::store::WritingStore;
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result};

/// Result of [`Ledger::consume`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consumption {
  pub user_id:         Uuid,
  pub month:           String,
  pub charge:          Charge,
  /// The month's counter after the charge.
  pub words_generated: i64,
}

/// Word-credit accounting over a [`WritingStore`].
///
/// Reads and writes are separate store calls with no lock between them; two
/// concurrent charges for one user can both see the same starting balance.
/// The store clamps the extra balance at zero, so the race can under-charge
/// but never drive a balance negative.
pub struct Ledger<S> {
  store:         Arc<S>,
  default_limit: WordLimit,
}

impl<S> Clone for Ledger<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), default_limit: self.default_limit }
  }
}

impl<S> Ledger<S>
where
  S: WritingStore,
{
  /// `default_limit` is the quota given to users seen for the first time.
  pub fn new(store: Arc<S>, default_limit: WordLimit) -> Self {
    Self { store, default_limit }
  }

  async fn profile(&self, user_id: Uuid) -> Result<Profile> {
    self
      .store
      .ensure_profile(user_id, self.default_limit)
      .await
      .map_err(Error::store)
  }

  /// Charge `word_count` generated words to `user_id`.
  ///
  /// Fills the monthly quota first and draws any overflow from the extra
  /// balance. Words beyond both are reported as `uncharged` and logged; the
  /// generation already happened, so nothing is blocked.
  pub async fn consume(&self, user_id: Uuid, word_count: i64) -> Result<Consumption> {
    let month = month_key(Utc::now());

    if word_count <= 0 {
      let words_generated = self
        .store
        .words_generated(user_id, &month)
        .await
        .map_err(Error::store)?;
      return Ok(Consumption { user_id, month, charge: Charge::default(), words_generated });
    }

    let profile = self.profile(user_id).await?;
    let used = self
      .store
      .words_generated(user_id, &month)
      .await
      .map_err(Error::store)?;

    let mut charge = plan_charge(
      profile.monthly_word_limit,
      used,
      profile.extra_words_balance,
      word_count,
    );

    let words_generated = self
      .store
      .increment_words_generated(user_id, &month, charge.monthly)
      .await
      .map_err(Error::store)?;

    if charge.extra > 0 {
      let drawn = self
        .store
        .use_extra_credits(user_id, charge.extra)
        .await
        .map_err(Error::store)?;
      // A concurrent draw may have emptied the balance since it was read.
      charge.uncharged += charge.extra - drawn;
      charge.extra = drawn;
    }

    if charge.uncharged > 0 {
      tracing::warn!(
        %user_id,
        word_count,
        uncharged = charge.uncharged,
        "generation exceeded monthly quota and extra balance"
      );
    }
    tracing::debug!(%user_id, %month, ?charge, "charged generated words");

    Ok(Consumption { user_id, month, charge, words_generated })
  }

  /// The user's position for the current month.
  pub async fn usage_summary(&self, user_id: Uuid) -> Result<UsageSummary> {
    let profile = self.profile(user_id).await?;
    let month = month_key(Utc::now());
    let used = self
      .store
      .words_generated(user_id, &month)
      .await
      .map_err(Error::store)?;
    Ok(UsageSummary::new(&profile, month, used))
  }

  /// Advisory pre-flight check: would `words` more words be covered?
  pub async fn can_generate(&self, user_id: Uuid, words: i64) -> Result<bool> {
    Ok(self.usage_summary(user_id).await?.can_generate(words))
  }

  /// Credit a purchase, referral bonus, or admin grant.
  pub async fn add_extra_credits(&self, grant: NewCreditGrant) -> Result<CreditGrant> {
    self.profile(grant.user_id).await?;
    let user_id = grant.user_id;
    let recorded = self
      .store
      .add_extra_credits(grant)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      %user_id,
      kind = %recorded.kind,
      amount = recorded.amount,
      "extra credits added"
    );
    Ok(recorded)
  }

  pub async fn credit_grants(&self, user_id: Uuid) -> Result<Vec<CreditGrant>> {
    self
      .store
      .list_credit_grants(user_id)
      .await
      .map_err(Error::store)
  }

  pub async fn set_monthly_limit(&self, user_id: Uuid, limit: WordLimit) -> Result<Profile> {
    self.profile(user_id).await?;
    self
      .store
      .set_monthly_limit(user_id, limit)
      .await
      .map_err(Error::store)
  }

  /// The monthly reset job.
  ///
  /// `cutoff` defaults to the start of the current month. Usage records
  /// older than `retention_months` before the current month are dropped.
  pub async fn reset_credits(
    &self,
    cutoff: Option<DateTime<Utc>>,
    retention_months: u32,
  ) -> Result<u64> {
    let now = Utc::now();
    let cutoff = cutoff.unwrap_or_else(|| start_of_month(now));
    let oldest_kept = months_before(&month_key(now), retention_months)?;

    let reset = self
      .store
      .reset_credits(cutoff, &oldest_kept)
      .await
      .map_err(Error::store)?;
    tracing::info!(reset, %cutoff, %oldest_kept, "monthly credit reset complete");
    Ok(reset)
  }
}

fn start_of_month(at: DateTime<Utc>) -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
    .single()
    .unwrap_or(at)
}

#[cfg(test)]
mod tests {
  use folio_core::ledger::CreditKind;
  use folio_store_sqlite::SqliteStore;

  use super::*;

  async fn ledger(default_limit: WordLimit) -> (Ledger<SqliteStore>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    (Ledger::new(store.clone(), default_limit), store)
  }

  /// Put a user at `used` words this month with `extra` in the balance.
  async fn seed(ledger: &Ledger<SqliteStore>, store: &SqliteStore, used: i64, extra: i64) -> Uuid {
    let user = Uuid::new_v4();
    ledger.profile(user).await.unwrap();
    store
      .increment_words_generated(user, &month_key(Utc::now()), used)
      .await
      .unwrap();
    if extra > 0 {
      ledger
        .add_extra_credits(NewCreditGrant::top_up(user, CreditKind::Purchase, extra, None).unwrap())
        .await
        .unwrap();
    }
    user
  }

  #[tokio::test]
  async fn overflow_is_clamped_and_drawn_from_extra() {
    let (ledger, store) = ledger(WordLimit::Monthly(5000)).await;
    let user = seed(&ledger, &store, 4800, 1000).await;

    let c = ledger.consume(user, 500).await.unwrap();
    assert_eq!(c.words_generated, 5000);
    assert_eq!(c.charge.extra, 300);

    let summary = ledger.usage_summary(user).await.unwrap();
    assert_eq!(summary.words_generated, 5000);
    assert_eq!(summary.extra_words_balance, 700);
    assert_eq!(summary.remaining, Some(0));
  }

  #[tokio::test]
  async fn within_quota_touches_only_the_counter() {
    let (ledger, store) = ledger(WordLimit::Monthly(5000)).await;
    let user = seed(&ledger, &store, 1000, 0).await;

    let c = ledger.consume(user, 2000).await.unwrap();
    assert_eq!(c.words_generated, 3000);
    assert_eq!(c.charge, Charge { monthly: 2000, extra: 0, uncharged: 0 });
    assert_eq!(ledger.usage_summary(user).await.unwrap().extra_words_balance, 0);
  }

  #[tokio::test]
  async fn unlimited_plan_records_everything() {
    let (ledger, store) = ledger(WordLimit::Unlimited).await;
    let user = seed(&ledger, &store, 999_999, 40).await;

    let c = ledger.consume(user, 10_000).await.unwrap();
    assert_eq!(c.words_generated, 1_009_999);

    let summary = ledger.usage_summary(user).await.unwrap();
    assert_eq!(summary.extra_words_balance, 40);
    assert_eq!(summary.remaining, None);
  }

  #[tokio::test]
  async fn zero_words_changes_nothing() {
    let (ledger, store) = ledger(WordLimit::Monthly(100)).await;
    let fresh = Uuid::new_v4();

    let c = ledger.consume(fresh, 0).await.unwrap();
    assert_eq!(c.charge, Charge::default());
    assert!(store.get_profile(fresh).await.unwrap().is_none());

    let user = seed(&ledger, &store, 100, 20).await;
    let before = ledger.usage_summary(user).await.unwrap();
    ledger.consume(user, 0).await.unwrap();
    assert_eq!(ledger.usage_summary(user).await.unwrap(), before);
    assert_eq!(ledger.credit_grants(user).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn excess_beyond_balance_is_reported_uncharged() {
    let (ledger, store) = ledger(WordLimit::Monthly(100)).await;
    let user = seed(&ledger, &store, 90, 5).await;

    let c = ledger.consume(user, 50).await.unwrap();
    assert_eq!(c.charge, Charge { monthly: 10, extra: 5, uncharged: 35 });
    assert_eq!(c.words_generated, 100);
    assert_eq!(ledger.usage_summary(user).await.unwrap().extra_words_balance, 0);
  }

  #[tokio::test]
  async fn first_charge_creates_a_default_profile() {
    let (ledger, store) = ledger(WordLimit::Monthly(5000)).await;
    let user = Uuid::new_v4();

    ledger.consume(user, 12).await.unwrap();
    let profile = store.get_profile(user).await.unwrap().unwrap();
    assert_eq!(profile.monthly_word_limit, WordLimit::Monthly(5000));
  }

  #[tokio::test]
  async fn preflight_counts_quota_and_extra() {
    let (ledger, store) = ledger(WordLimit::Monthly(1000)).await;
    let user = seed(&ledger, &store, 900, 50).await;

    assert!(ledger.can_generate(user, 150).await.unwrap());
    assert!(!ledger.can_generate(user, 151).await.unwrap());

    ledger.set_monthly_limit(user, WordLimit::Unlimited).await.unwrap();
    assert!(ledger.can_generate(user, 1_000_000).await.unwrap());
  }

  #[tokio::test]
  async fn reset_defaults_to_start_of_month() {
    let (ledger, store) = ledger(WordLimit::Monthly(1000)).await;
    seed(&ledger, &store, 10, 0).await;

    assert_eq!(ledger.reset_credits(None, 12).await.unwrap(), 1);
    // Reset this month already.
    assert_eq!(ledger.reset_credits(None, 12).await.unwrap(), 0);
  }

  #[test]
  fn start_of_month_truncates() {
    let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
    assert_eq!(start_of_month(at), Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
  }
}
