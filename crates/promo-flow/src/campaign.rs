//! The campaign aggregate.
//!
//! A campaign is one time-boxed, rule-based discount: what it discounts
//! (product targeting), how (discount configuration), and when (schedule +
//! status). The entity here is pure data plus invariant-preserving
//! operations; every lifecycle side effect fires through the state manager,
//! never through direct field writes.
//!
//! ## Status machine
//!
//! The legal status edges live on [`CampaignStatus::can_transition_to`] so
//! the manager, the state manager, and the reconciliation loop all consult
//! one table. A transition to the current status is always legal (no-op).
//!
//! ## Time handling
//!
//! `starts_at`/`ends_at` are stored in UTC, always. The authoring timezone
//! is kept separately for display; wall-clock inputs are converted exactly
//! once, at the entity boundary, via [`ScheduleTime::resolve`].

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use promo_core::{ActorId, CampaignId};

use crate::error::{Error, Result};

/// Campaign lifecycle statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Being edited; not visible to shoppers.
    Draft,
    /// Waiting for its start date.
    Scheduled,
    /// Currently applying discounts.
    Active,
    /// Manually suspended; the end date still stands.
    Paused,
    /// Past its end date (or manually ended).
    Expired,
    /// Retired; kept for reporting only.
    Archived,
}

impl CampaignStatus {
    /// Returns true if the transition from self to target is valid.
    ///
    /// A transition to the current status is always allowed (treated as a
    /// no-op by the state manager). The status set is closed, so unlike a
    /// stringly-typed table there is no "unknown status" case to reject.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        if *self == target {
            return true;
        }
        match self {
            Self::Draft => matches!(target, Self::Active | Self::Scheduled | Self::Archived),
            Self::Scheduled => matches!(
                target,
                Self::Active | Self::Paused | Self::Draft | Self::Expired | Self::Archived
            ),
            Self::Active => matches!(
                target,
                Self::Paused | Self::Scheduled | Self::Expired | Self::Draft | Self::Archived
            ),
            Self::Paused => matches!(
                target,
                Self::Active | Self::Scheduled | Self::Expired | Self::Draft | Self::Archived
            ),
            Self::Expired => matches!(target, Self::Draft | Self::Scheduled | Self::Archived),
            Self::Archived => matches!(target, Self::Draft),
        }
    }

    /// Returns true if no future timer should ever exist for this status.
    #[must_use]
    pub const fn no_future_events(&self) -> bool {
        matches!(self, Self::Expired | Self::Archived)
    }
}

impl Default for CampaignStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Expired => write!(f, "expired"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Discount mechanics supported by the engine.
///
/// Price math is the storefront's concern; the engine only stores the
/// configuration and tracks when it may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percentage off each targeted product.
    Percentage,
    /// Fixed amount off each targeted product.
    Fixed,
    /// Buy-one-get-one (configurable quantities).
    Bogo,
    /// Quantity-tiered percentage/amount.
    Tiered,
    /// Discount unlocked at a cart spend threshold.
    SpendThreshold,
}

/// One quantity tier for [`DiscountType::Tiered`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountTier {
    /// Minimum quantity to qualify for this tier.
    pub min_quantity: u32,
    /// Discount value at this tier.
    pub value: f64,
}

/// One spend threshold for [`DiscountType::SpendThreshold`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendThresholdRule {
    /// Minimum cart spend in minor units to qualify.
    pub min_spend_cents: u64,
    /// Discount value unlocked at this threshold.
    pub value: f64,
}

/// BOGO quantities for [`DiscountType::Bogo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BogoRule {
    /// Quantity the shopper must buy.
    pub buy_quantity: u32,
    /// Quantity granted at a discount.
    pub get_quantity: u32,
}

/// Nested discount rules; which parts apply depends on the discount type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRules {
    /// Quantity tiers (tiered discounts).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<DiscountTier>,
    /// Spend thresholds (spend-threshold discounts).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<SpendThresholdRule>,
    /// BOGO quantities (BOGO discounts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bogo: Option<BogoRule>,
    /// Optional badge text shown on targeted products.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_text: Option<String>,
}

/// Full discount configuration of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountConfig {
    /// Discount mechanic.
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    /// Primary discount value (percent or amount, per type).
    pub value: f64,
    /// Type-specific nested rules.
    #[serde(default)]
    pub rules: DiscountRules,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            discount_type: DiscountType::Percentage,
            value: 0.0,
            rules: DiscountRules::default(),
        }
    }
}

impl DiscountConfig {
    /// Returns true if the configuration carries an applicable discount.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.value > 0.0
            || !self.rules.tiers.is_empty()
            || !self.rules.thresholds.is_empty()
            || self.rules.bogo.is_some()
    }
}

/// How the set of targeted products is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionType {
    /// Every product in the store.
    AllProducts,
    /// An explicit product list.
    SpecificProducts,
    /// A random sample, re-drawn on every activation check.
    RandomProducts,
    /// A selector-scored sample, resolved once per activation.
    SmartSelection,
}

impl SelectionType {
    /// Returns true if the selection must be resolved by the product
    /// selector rather than authored directly.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::RandomProducts | Self::SmartSelection)
    }
}

impl Default for SelectionType {
    fn default() -> Self {
        Self::AllProducts
    }
}

/// How filter conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionsLogic {
    /// Every condition must match.
    All,
    /// Any condition may match.
    Any,
}

impl Default for ConditionsLogic {
    fn default() -> Self {
        Self::All
    }
}

/// One product-filter predicate. Opaque to the engine; evaluated by the
/// external product selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Product field the predicate reads (price, stock, sales...).
    pub field: String,
    /// Comparison operator.
    pub operator: String,
    /// Comparison operand.
    pub value: serde_json::Value,
}

/// How the resolved product list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilationMethod {
    /// Authored explicitly; no resolution happened.
    Explicit,
    /// Random sample drawn by the selector.
    Random,
    /// Selector-scored sample.
    Smart,
    /// Condition predicates evaluated by the selector.
    Conditions,
}

impl std::fmt::Display for CompilationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Random => write!(f, "random"),
            Self::Smart => write!(f, "smart"),
            Self::Conditions => write!(f, "conditions"),
        }
    }
}

/// Recurrence cadence for recurring parent campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    /// Every `interval` days.
    Daily,
    /// Every `interval` weeks.
    Weekly,
    /// Every `interval` months (calendar arithmetic, clamped to month end).
    Monthly,
}

/// When a recurrence stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecurrenceEnd {
    /// Runs until the rolling cache horizon.
    Never,
    /// Stops after a total number of occurrences.
    AfterOccurrences {
        /// Total occurrence budget, counting already-materialized ones.
        count: u32,
    },
    /// Stops at an absolute date.
    OnDate {
        /// Last instant an occurrence may start.
        date: DateTime<Utc>,
    },
}

/// Recurrence configuration for a recurring parent campaign.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringConfig {
    /// Cadence unit.
    pub pattern: RecurrencePattern,
    /// Cadence multiplier (minimum 1; clamped on construction).
    pub interval: u32,
    /// Stop condition.
    pub end: RecurrenceEnd,
}

impl RecurringConfig {
    /// Creates a config, clamping a zero interval up to 1.
    #[must_use]
    pub fn new(pattern: RecurrencePattern, interval: u32, end: RecurrenceEnd) -> Self {
        Self {
            pattern,
            interval: interval.max(1),
            end,
        }
    }
}

/// Aggregate performance counters, reset on duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceCounters {
    /// Times a targeted product page was viewed.
    pub views: u64,
    /// Times a targeted product was added to a cart.
    pub clicks: u64,
    /// Completed orders containing a targeted product.
    pub conversions: u64,
    /// Discounted revenue in minor units.
    pub revenue_cents: u64,
}

/// A schedule instant as authored: either already absolute, or a wall-clock
/// time in the campaign's authoring timezone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleTime {
    /// An absolute UTC instant.
    Utc(DateTime<Utc>),
    /// A wall-clock time to resolve in the authoring timezone.
    Local(NaiveDateTime),
}

impl ScheduleTime {
    /// Resolves this instant to UTC in the given timezone.
    ///
    /// Ambiguous wall-clock times (DST fold) resolve to the earlier
    /// instant; nonexistent times (DST gap) are a validation error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a nonexistent wall-clock time.
    pub fn resolve(self, tz: Tz) -> Result<DateTime<Utc>> {
        match self {
            Self::Utc(instant) => Ok(instant),
            Self::Local(naive) => naive
                .and_local_timezone(tz)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| {
                    Error::validation(format!("wall-clock time {naive} does not exist in {tz}"))
                }),
        }
    }
}

/// Priority bounds for campaigns (higher wins when campaigns overlap).
pub const PRIORITY_MIN: u8 = 1;
/// Upper priority bound.
pub const PRIORITY_MAX: u8 = 10;
/// Priority assigned when the author does not choose one.
pub const PRIORITY_DEFAULT: u8 = 5;

/// Payload for creating a campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSpec {
    /// Display name; also the slug source.
    pub name: String,
    /// Initial status (defaults to draft).
    #[serde(default)]
    pub status: CampaignStatus,
    /// Priority 1-10 (defaults to 5; clamped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Schedule start, absolute or authoring-local.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<ScheduleTime>,
    /// Schedule end, absolute or authoring-local.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<ScheduleTime>,
    /// Authoring timezone (defaults to UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Product selection mode.
    #[serde(default)]
    pub selection: SelectionType,
    /// Explicit product IDs (specific selection; or compiled output).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_ids: Vec<u64>,
    /// Targeted category IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_ids: Vec<u64>,
    /// Targeted tag IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<u64>,
    /// Product filter predicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// How the predicates combine.
    #[serde(default)]
    pub conditions_logic: ConditionsLogic,
    /// Discount configuration.
    #[serde(default)]
    pub discount: DiscountConfig,
    /// Recurrence, for recurring parents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<RecurringConfig>,
    /// Creating actor; `None` for system-created campaigns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<ActorId>,
}

/// Partial update payload. `None` leaves a field untouched; the
/// double-`Option` fields distinguish "untouched" from "set to null".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignUpdate {
    /// New name (slug is not re-derived on rename).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New status (legality is checked by the caller).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CampaignStatus>,
    /// New priority (clamped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// New start, or explicit null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<Option<ScheduleTime>>,
    /// New end, or explicit null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<Option<ScheduleTime>>,
    /// New authoring timezone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// New selection mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionType>,
    /// Replacement product list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_ids: Option<Vec<u64>>,
    /// Replacement category list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_ids: Option<Vec<u64>>,
    /// Replacement tag list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<u64>>,
    /// Replacement predicates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    /// New predicate logic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions_logic: Option<ConditionsLogic>,
    /// New discount configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<DiscountConfig>,
    /// New recurrence, or explicit null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Option<RecurringConfig>>,
}

/// One discount campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Store-assigned identifier; `None` until first persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<CampaignId>,
    /// Stable identity assigned at construction.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// URL-safe unique slug derived from the name.
    pub slug: String,
    /// Lifecycle status.
    pub status: CampaignStatus,
    /// Priority 1-10; higher wins when campaigns overlap.
    pub priority: u8,
    /// Schedule start (UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    /// Schedule end (UTC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Authoring timezone for display; stored instants stay UTC.
    pub timezone: String,
    /// Product selection mode.
    pub selection: SelectionType,
    /// Explicit or compiled product IDs.
    #[serde(default)]
    pub product_ids: Vec<u64>,
    /// Targeted category IDs.
    #[serde(default)]
    pub category_ids: Vec<u64>,
    /// Targeted tag IDs.
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    /// Product filter predicates.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// How the predicates combine.
    pub conditions_logic: ConditionsLogic,
    /// Discount configuration.
    pub discount: DiscountConfig,
    /// When the dynamic selection was last resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_at: Option<DateTime<Utc>>,
    /// How the selection was resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_method: Option<CompilationMethod>,
    /// Recurrence, for recurring parents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<RecurringConfig>,
    /// Aggregate performance counters.
    #[serde(default)]
    pub counters: PerformanceCounters,
    /// Creating actor; `None` for system-created campaigns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<ActorId>,
    /// Last mutating actor; `None` marks an automatic transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<ActorId>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-lock counter, enforced by the store on save.
    pub version: u64,
}

impl Campaign {
    /// Builds a campaign from a creation payload.
    ///
    /// Validates the name and timezone, clamps the priority into 1-10,
    /// filters targeting IDs to positive values, resolves schedule inputs
    /// to UTC, and derives the slug from the name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty name or unresolvable
    /// schedule time, [`Error::InvalidTimezone`] for a bad timezone string.
    pub fn from_spec(spec: CampaignSpec, now: DateTime<Utc>) -> Result<Self> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("campaign name must not be empty"));
        }

        let timezone = spec.timezone.unwrap_or_else(|| "UTC".to_string());
        let tz = parse_timezone(&timezone)?;

        let starts_at = spec.starts_at.map(|t| t.resolve(tz)).transpose()?;
        let ends_at = spec.ends_at.map(|t| t.resolve(tz)).transpose()?;
        if let (Some(start), Some(end)) = (starts_at, ends_at) {
            if end <= start {
                return Err(Error::validation("end date must be after start date"));
            }
        }

        let slug = slugify(&name);

        Ok(Self {
            id: None,
            uuid: Uuid::new_v4(),
            slug,
            status: spec.status,
            priority: clamp_priority(spec.priority.unwrap_or(PRIORITY_DEFAULT)),
            starts_at,
            ends_at,
            timezone,
            selection: spec.selection,
            product_ids: filter_ids(spec.product_ids),
            category_ids: filter_ids(spec.category_ids),
            tag_ids: filter_ids(spec.tag_ids),
            conditions: spec.conditions,
            conditions_logic: spec.conditions_logic,
            discount: spec.discount,
            compiled_at: None,
            compilation_method: None,
            recurring: spec.recurring,
            counters: PerformanceCounters::default(),
            created_by: spec.created_by,
            updated_by: spec.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
            name,
        })
    }

    /// Applies a partial update in place.
    ///
    /// Schedule inputs are resolved against the (possibly updated)
    /// authoring timezone. Does not touch status side effects; callers go
    /// through the state manager for that.
    ///
    /// # Errors
    ///
    /// Returns the same validation errors as [`Campaign::from_spec`].
    pub fn apply_update(&mut self, update: CampaignUpdate, now: DateTime<Utc>) -> Result<()> {
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::validation("campaign name must not be empty"));
            }
            self.name = name;
        }
        if let Some(timezone) = update.timezone {
            parse_timezone(&timezone)?;
            self.timezone = timezone;
        }
        let tz = parse_timezone(&self.timezone)?;

        if let Some(starts_at) = update.starts_at {
            self.starts_at = starts_at.map(|t| t.resolve(tz)).transpose()?;
        }
        if let Some(ends_at) = update.ends_at {
            self.ends_at = ends_at.map(|t| t.resolve(tz)).transpose()?;
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at) {
            if end <= start {
                return Err(Error::validation("end date must be after start date"));
            }
        }

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(priority) = update.priority {
            self.priority = clamp_priority(priority);
        }
        if let Some(selection) = update.selection {
            if selection != self.selection {
                // A different selection mode invalidates any previous resolution.
                self.compiled_at = None;
                self.compilation_method = None;
            }
            self.selection = selection;
        }
        if let Some(product_ids) = update.product_ids {
            self.product_ids = filter_ids(product_ids);
        }
        if let Some(category_ids) = update.category_ids {
            self.category_ids = filter_ids(category_ids);
        }
        if let Some(tag_ids) = update.tag_ids {
            self.tag_ids = filter_ids(tag_ids);
        }
        if let Some(conditions) = update.conditions {
            self.conditions = conditions;
        }
        if let Some(logic) = update.conditions_logic {
            self.conditions_logic = logic;
        }
        if let Some(discount) = update.discount {
            self.discount = discount;
        }
        if let Some(recurring) = update.recurring {
            self.recurring = recurring;
        }

        self.updated_at = now;
        Ok(())
    }

    /// Returns true if the resolved product list must be (re)computed
    /// before the campaign may apply discounts.
    ///
    /// Random selections are re-drawn on every check; other dynamic
    /// selections (smart, condition-filtered) only until first compiled.
    #[must_use]
    pub fn needs_recompilation(&self) -> bool {
        match self.selection {
            SelectionType::RandomProducts => true,
            SelectionType::SmartSelection => self.compiled_at.is_none(),
            SelectionType::AllProducts | SelectionType::SpecificProducts => {
                !self.conditions.is_empty() && self.compiled_at.is_none()
            }
        }
    }

    /// Records a completed selection resolution.
    pub fn mark_compiled(&mut self, method: CompilationMethod, now: DateTime<Utc>) {
        self.compiled_at = Some(now);
        self.compilation_method = Some(method);
    }

    /// Returns true if the campaign has any product targeting at all.
    #[must_use]
    pub fn has_product_targeting(&self) -> bool {
        self.selection == SelectionType::AllProducts
            || !self.product_ids.is_empty()
            || !self.category_ids.is_empty()
            || !self.tag_ids.is_empty()
    }

    /// Returns true if the start date exists and has passed.
    #[must_use]
    pub fn start_has_passed(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.is_some_and(|start| start <= now)
    }

    /// Returns true if the end date exists and has passed.
    #[must_use]
    pub fn end_has_passed(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|end| end <= now)
    }

    /// Returns true if the campaign is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Marks the campaign soft-deleted.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Zeroes the performance counters.
    pub fn reset_counters(&mut self) {
        self.counters = PerformanceCounters::default();
    }
}

/// Clamps a priority into the valid 1-10 band.
#[must_use]
pub fn clamp_priority(priority: u8) -> u8 {
    priority.clamp(PRIORITY_MIN, PRIORITY_MAX)
}

/// Drops non-positive IDs from a targeting list.
fn filter_ids(ids: Vec<u64>) -> Vec<u64> {
    ids.into_iter().filter(|id| *id > 0).collect()
}

/// Parses an authoring timezone string.
fn parse_timezone(timezone: &str) -> Result<Tz> {
    Tz::from_str(timezone).map_err(|_| Error::InvalidTimezone {
        timezone: timezone.to_string(),
    })
}

/// Derives a URL-safe slug from a campaign name.
///
/// Lowercases, maps runs of non-alphanumeric characters to single hyphens,
/// and trims leading/trailing hyphens.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
