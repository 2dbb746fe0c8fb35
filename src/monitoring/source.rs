//! Data Source Abstraction
//!
//! The data-fetch collaborator returns raw records for one domain, bounded by
//! a lookback window and a row cap. The wire format behind it is not ours.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::domain::Domain;

/// Bounds applied to a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Only records newer than this are relevant
    pub since: DateTime<Utc>,

    /// Lookback used to derive `since`
    pub lookback: Duration,

    /// Maximum rows to return
    pub row_cap: usize,
}

impl FetchWindow {
    /// Window ending at `now`
    pub fn ending_at(now: DateTime<Utc>, lookback: Duration, row_cap: usize) -> Self {
        let since = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|lb| now.checked_sub_signed(lb))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            since,
            lookback,
            row_cap,
        }
    }
}

/// Processing state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Processed,
    Pending,
    Failed,
}

/// One document row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub state: DocumentState,
    pub created_at: DateTime<Utc>,
}

/// One message row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub delivered: bool,
    pub sent_at: DateTime<Utc>,
}

/// Usage of one storage bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketUsage {
    pub bucket: String,
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub object_count: u64,
}

/// One user profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub locked: bool,
}

/// Kind of security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    FailedLogin,
    PolicyViolation,
    SuspiciousActivity,
}

/// One security or audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<String>,
}

/// Aggregated invocation stats for one edge function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionStats {
    pub function: String,
    pub invocations: u64,
    /// Error rate in percent
    pub error_rate: f64,
    pub avg_duration_ms: f64,
}

/// Raw records for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "records", rename_all = "snake_case")]
pub enum RawBatch {
    Documents(Vec<DocumentRecord>),
    Messages(Vec<MessageRecord>),
    Storage(Vec<BucketUsage>),
    Users(Vec<UserRecord>),
    Security(Vec<SecurityEvent>),
    EdgeFunctions(Vec<FunctionStats>),
}

impl RawBatch {
    /// A batch of `domain`'s kind with no records
    pub fn empty(domain: Domain) -> Self {
        match domain {
            Domain::Documents => RawBatch::Documents(Vec::new()),
            Domain::Messages => RawBatch::Messages(Vec::new()),
            Domain::Storage => RawBatch::Storage(Vec::new()),
            Domain::Users => RawBatch::Users(Vec::new()),
            Domain::Security => RawBatch::Security(Vec::new()),
            Domain::EdgeFunctions => RawBatch::EdgeFunctions(Vec::new()),
        }
    }

    /// Domain the records belong to
    pub fn domain(&self) -> Domain {
        match self {
            RawBatch::Documents(_) => Domain::Documents,
            RawBatch::Messages(_) => Domain::Messages,
            RawBatch::Storage(_) => Domain::Storage,
            RawBatch::Users(_) => Domain::Users,
            RawBatch::Security(_) => Domain::Security,
            RawBatch::EdgeFunctions(_) => Domain::EdgeFunctions,
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        match self {
            RawBatch::Documents(r) => r.len(),
            RawBatch::Messages(r) => r.len(),
            RawBatch::Storage(r) => r.len(),
            RawBatch::Users(r) => r.len(),
            RawBatch::Security(r) => r.len(),
            RawBatch::EdgeFunctions(r) => r.len(),
        }
    }

    /// Whether the batch has no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBatch {
    /// Records returned
    pub batch: RawBatch,

    /// Set when some sub-sources failed and the records are incomplete
    pub partial: bool,
}

impl FetchedBatch {
    /// A complete batch
    pub fn complete(batch: RawBatch) -> Self {
        Self {
            batch,
            partial: false,
        }
    }

    /// An incomplete batch
    pub fn partial(batch: RawBatch) -> Self {
        Self {
            batch,
            partial: true,
        }
    }
}

/// Data-fetch collaborator
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the raw records for `domain` within `window`
    async fn fetch(&self, domain: Domain, window: &FetchWindow) -> Result<FetchedBatch>;
}
