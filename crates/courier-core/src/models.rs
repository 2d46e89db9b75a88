//! Domain models and strongly-typed identifiers.
//!
//! Defines notifications, batches, newtype ID wrappers, and the lifecycle
//! state machine. Includes database serialization traits so the models map
//! directly onto PostgreSQL rows.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Maximum content length in bytes accepted at intake.
pub const MAX_CONTENT_LENGTH: usize = 4096;

/// Default retry budget for new notifications.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Strongly-typed notification identifier.
///
/// Wraps a UUID so notification IDs cannot be mixed with batch IDs at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    /// Creates a new random notification ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NotificationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for NotificationId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for NotificationId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for NotificationId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed batch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Creates a new random batch ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for BatchId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for BatchId {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for BatchId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Text message delivery.
    Sms,
    /// Email delivery.
    Email,
    /// Mobile push delivery.
    Push,
}

impl Channel {
    /// All channels, in a fixed order. Used to build per-channel state.
    pub const ALL: [Self; 3] = [Self::Sms, Self::Email, Self::Push];

    /// Stable string form, also used as a metric label value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            "push" => Ok(Self::Push),
            _ => Err(CoreError::InvalidChannel),
        }
    }
}

impl sqlx::Type<PgDb> for Channel {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for Channel {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            "push" => Ok(Self::Push),
            _ => Err(format!("invalid channel: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for Channel {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Queue ordering tier. High is dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Critical traffic; small queue buffer for fast back-pressure.
    High,
    /// Bulk traffic.
    Normal,
    /// Background, best-effort traffic.
    Low,
}

impl Priority {
    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(CoreError::InvalidPriority),
        }
    }
}

impl sqlx::Type<PgDb> for Priority {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for Priority {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(format!("invalid priority: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for Priority {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Notification lifecycle status.
///
/// Transitions are strictly controlled:
///
/// ```text
/// pending   -> queued            (admission to the in-memory queue)
/// scheduled -> queued            (scheduled scheduler, at/after scheduled_at)
/// queued    -> processing        (worker claims the item)
/// processing -> sent             (provider accepted; terminal)
/// processing -> failed           (provider rejected or transport error)
/// failed    -> queued            (retry scheduler, while retries remain)
/// {pending,queued,scheduled,failed} -> cancelled
/// ```
///
/// `sent`, `cancelled`, and `failed` with retries exhausted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Persisted but not yet admitted to the queue.
    Pending,
    /// Waiting in a priority tier for a worker.
    Queued,
    /// A worker is actively dispatching it.
    Processing,
    /// Provider accepted delivery.
    Sent,
    /// Provider rejected or transport failed; may await a retry.
    Failed,
    /// Cancelled by user request.
    Cancelled,
    /// Deferred delivery; waits for its `scheduled_at` to arrive.
    Scheduled,
}

impl Status {
    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Scheduled => "scheduled",
        }
    }

    /// Whether a cancel request is legal in this status.
    ///
    /// `failed` remains cancellable because a retry may still be pending;
    /// cancelling prevents the retry scheduler from re-admitting the row.
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Queued | Self::Scheduled | Self::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<PgDb> for Status {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for Status {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "scheduled" => Ok(Self::Scheduled),
            _ => Err(format!("invalid status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for Status {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Core notification entity.
///
/// Each row is exclusively owned by the store; workers fetch a fresh copy at
/// dispatch time so in-memory queue items never carry stale state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    /// Unique identifier.
    pub id: NotificationId,

    /// Owning batch, when created through the batch endpoint.
    pub batch_id: Option<BatchId>,

    /// Delivery channel.
    pub channel: Channel,

    /// Destination address; opaque to the dispatcher.
    pub recipient: String,

    /// Message body; opaque to the dispatcher, 1..=4096 bytes.
    pub content: String,

    /// Queue tier.
    pub priority: Priority,

    /// Current lifecycle status.
    pub status: Status,

    /// Caller-supplied deduplication key, globally unique when present.
    pub idempotency_key: Option<String>,

    /// Provider failures accumulated so far. Monotonically non-decreasing.
    pub retry_count: i32,

    /// Retry budget; the notification fails terminally once exhausted.
    pub max_retries: i32,

    /// When the next retry becomes due. Set only while awaiting a retry.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Deferred-delivery time. Set only for scheduled notifications.
    pub scheduled_at: Option<DateTime<Utc>>,

    /// When the provider accepted delivery.
    pub sent_at: Option<DateTime<Utc>>,

    /// Provider-assigned message ID, recorded on success.
    pub provider_msg_id: Option<String>,

    /// Last provider error, recorded on failure.
    pub error_message: Option<String>,

    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,

    /// Bumped on every mutation.
    pub updated_at: DateTime<Utc>,
}

/// Batch of notifications created together.
///
/// Counters are eventually consistent: they are recomputed from the child
/// rows rather than updated transactionally with every child mutation.
/// `total` is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Batch {
    /// Unique identifier.
    pub id: BatchId,
    /// Number of child notifications; fixed at creation.
    pub total: i32,
    /// Children in any non-terminal status.
    pub pending: i32,
    /// Children delivered successfully.
    pub sent: i32,
    /// Children in failed status.
    pub failed: i32,
    /// Children cancelled.
    pub cancelled: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last counter refresh.
    pub updated_at: DateTime<Utc>,
}

/// Inbound payload for a single notification.
///
/// Channel and priority arrive as plain strings so that an unknown value
/// survives decoding and is rejected by [`validate`](Self::validate) with
/// the proper domain error, rather than dying inside the JSON extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    /// Delivery channel: `sms`, `email`, or `push`.
    pub channel: String,
    /// Destination address.
    pub recipient: String,
    /// Message body.
    pub content: String,
    /// Queue tier: `high`, `normal`, or `low`.
    pub priority: String,
    /// Optional deferred-delivery time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl CreateNotificationRequest {
    /// Validates intake rules: channel and priority must name known values,
    /// recipient must be non-empty, content must be within 1..=4096 bytes.
    pub fn validate(&self) -> Result<()> {
        self.channel.parse::<Channel>()?;
        self.priority.parse::<Priority>()?;
        if self.recipient.is_empty() {
            return Err(CoreError::InvalidRecipient);
        }
        if self.content.is_empty() || self.content.len() > MAX_CONTENT_LENGTH {
            return Err(CoreError::InvalidContent);
        }
        Ok(())
    }
}

/// Inbound payload wrapping a list of notification requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    /// Notifications to create atomically.
    pub notifications: Vec<CreateNotificationRequest>,
}

/// Query parameters for paginated notification listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to a single status.
    pub status: Option<Status>,
    /// Restrict to a single channel.
    pub channel: Option<Channel>,
    /// Created at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Created at or before this time.
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: i64,
    /// Rows per page.
    pub limit: i64,
}
