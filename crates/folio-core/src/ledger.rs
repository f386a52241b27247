//! Word-credit ledger types and the charge arithmetic.
//!
//! Every AI generation is billed in words. A user's words are charged first
//! against the monthly quota of their plan and, once that is exhausted,
//! against a non-expiring extra balance. The arithmetic lives here as a pure
//! function; storage backends only apply the resulting [`Charge`].

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Raw encoding of [`WordLimit::Unlimited`] in storage and on the wire.
pub const UNLIMITED: i64 = -1;

/// The monthly word quota of a user's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum WordLimit {
  Unlimited,
  Monthly(i64),
}

impl WordLimit {
  pub fn is_unlimited(&self) -> bool { matches!(self, Self::Unlimited) }
}

impl TryFrom<i64> for WordLimit {
  type Error = Error;

  fn try_from(raw: i64) -> Result<Self> {
    match raw {
      UNLIMITED => Ok(Self::Unlimited),
      n if n >= 0 => Ok(Self::Monthly(n)),
      n => Err(Error::InvalidLimit(n)),
    }
  }
}

impl From<WordLimit> for i64 {
  fn from(limit: WordLimit) -> Self {
    match limit {
      WordLimit::Unlimited => UNLIMITED,
      WordLimit::Monthly(n) => n,
    }
  }
}

// ─── Months ──────────────────────────────────────────────────────────────────

/// The `YYYY-MM` key a usage record is filed under.
pub fn month_key(at: DateTime<Utc>) -> String {
  format!("{:04}-{:02}", at.year(), at.month())
}

/// The `YYYY-MM` key `months` calendar months before `month`.
pub fn months_before(month: &str, months: u32) -> Result<String> {
  let invalid = || Error::InvalidMonth(month.to_owned());
  let (year, mon) = month.split_once('-').ok_or_else(invalid)?;
  let year: i64 = year.parse().map_err(|_| invalid())?;
  let mon: i64 = mon.parse().map_err(|_| invalid())?;
  if !(1..=12).contains(&mon) {
    return Err(invalid());
  }

  let index = year * 12 + (mon - 1) - i64::from(months);
  Ok(format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1))
}

// ─── Profiles and usage ──────────────────────────────────────────────────────

/// The billing-relevant slice of a user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub user_id:             Uuid,
  pub monthly_word_limit:  WordLimit,
  /// Never negative.
  pub extra_words_balance: i64,
  pub credits_reset_at:    Option<DateTime<Utc>>,
  pub created_at:          DateTime<Utc>,
}

/// Words generated by one user in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
  pub user_id:         Uuid,
  pub month:           String,
  pub words_generated: i64,
}

// ─── Credit grants ───────────────────────────────────────────────────────────

/// Why the extra balance changed.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CreditKind {
  /// Bought through the payment provider.
  Purchase,
  /// Bonus for referring another user.
  Referral,
  AdminGrant,
  /// Words drawn by generation after the monthly quota ran out.
  OverflowDraw,
}

/// An append-only record of a change to a user's extra balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditGrant {
  pub grant_id:    Uuid,
  pub user_id:     Uuid,
  pub kind:        CreditKind,
  /// Positive for top-ups, negative for overflow draws.
  pub amount:      i64,
  pub note:        Option<String>,
  pub recorded_at: DateTime<Utc>,
}

/// Input to [`crate::store::WritingStore::add_extra_credits`].
#[derive(Debug, Clone)]
pub struct NewCreditGrant {
  pub user_id: Uuid,
  pub kind:    CreditKind,
  pub amount:  i64,
  pub note:    Option<String>,
}

impl NewCreditGrant {
  /// Validate a top-up. Overflow draws are recorded by the store itself.
  pub fn top_up(
    user_id: Uuid,
    kind: CreditKind,
    amount: i64,
    note: Option<String>,
  ) -> Result<Self> {
    if amount <= 0 {
      return Err(Error::NonPositiveCredit(amount));
    }
    if kind == CreditKind::OverflowDraw {
      return Err(Error::ReservedCreditKind(kind.to_string()));
    }
    Ok(Self { user_id, kind, amount, note })
  }
}

// ─── Charge arithmetic ───────────────────────────────────────────────────────

/// How a single generation of `word_count` words is billed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
  /// Added to the monthly usage counter.
  pub monthly:   i64,
  /// Drawn from the extra balance.
  pub extra:     i64,
  /// Generated beyond quota and balance; not billed anywhere.
  pub uncharged: i64,
}

impl Charge {
  pub fn is_empty(&self) -> bool { self.monthly == 0 && self.extra == 0 }
}

/// Split `word_count` words between the monthly quota and the extra balance.
///
/// With an unlimited plan everything goes to the monthly counter. Otherwise
/// the counter is filled up to `limit` and the overflow is drawn from
/// `extra`, never more than `extra` holds. Whatever is left is reported as
/// `uncharged`.
pub fn plan_charge(
  limit: WordLimit,
  used: i64,
  extra: i64,
  word_count: i64,
) -> Charge {
  if word_count <= 0 {
    return Charge::default();
  }

  let limit = match limit {
    WordLimit::Unlimited => {
      return Charge { monthly: word_count, extra: 0, uncharged: 0 };
    }
    WordLimit::Monthly(limit) => limit,
  };

  let remaining = (limit - used).max(0);
  if word_count <= remaining {
    return Charge { monthly: word_count, extra: 0, uncharged: 0 };
  }

  let overflow = word_count - remaining;
  let drawn = overflow.min(extra.max(0));
  Charge { monthly: remaining, extra: drawn, uncharged: overflow - drawn }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// A user's position in the ledger for the current month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
  pub user_id:             Uuid,
  pub month:               String,
  pub monthly_word_limit:  WordLimit,
  pub words_generated:     i64,
  /// `None` when the plan is unlimited.
  pub remaining:           Option<i64>,
  pub extra_words_balance: i64,
  pub unlimited:           bool,
}

impl UsageSummary {
  pub fn new(profile: &Profile, month: String, words_generated: i64) -> Self {
    let remaining = match profile.monthly_word_limit {
      WordLimit::Unlimited => None,
      WordLimit::Monthly(limit) => Some((limit - words_generated).max(0)),
    };
    Self {
      user_id: profile.user_id,
      month,
      monthly_word_limit: profile.monthly_word_limit,
      words_generated,
      remaining,
      extra_words_balance: profile.extra_words_balance,
      unlimited: profile.monthly_word_limit.is_unlimited(),
    }
  }

  /// Whether `words` more words fit in the remaining quota plus extra balance.
  pub fn can_generate(&self, words: i64) -> bool {
    match self.remaining {
      None => true,
      Some(remaining) => remaining + self.extra_words_balance >= words,
    }
  }
}
