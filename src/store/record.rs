//! Cache Record Types
//!
//! Records are JSON documents holding a tagged payload plus the metadata that
//! decides liveness: `stored_at`, `ttl_ms` and `schema_version`.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assets::QualityTier;
use crate::clock::to_chrono;

/// Schema version of the records written by this build.
///
/// Bump whenever a payload shape changes; the next store open clears every
/// record written under an older version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Payload Kinds
// =============================================================================

/// One step of a guided wiring exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStep {
    /// Position in the exercise (0-based)
    pub index: u32,
    /// Short heading
    pub title: String,
    /// Instruction text shown to the trainee
    pub instruction: String,
    /// Component ids to highlight while this step is active
    #[serde(default)]
    pub highlighted_components: Vec<String>,
}

/// Placement of a component on the diagram canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPlacement {
    pub id: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

/// A wire between two component terminals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireConnection {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Serialized diagram layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramConfiguration {
    pub diagram_id: String,
    pub bank_type: String,
    pub components: Vec<ComponentPlacement>,
    pub connections: Vec<WireConnection>,
}

/// Trainee progress through one diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub diagram_id: String,
    pub current_step: u32,
    pub completed_steps: Vec<u32>,
    pub mistakes: u32,
    pub updated_at: DateTime<Utc>,
}

/// Raw encoded image bytes for a loaded asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBytes {
    /// Quality tier the bytes were read at
    pub quality: QualityTier,
    /// Encoded image data
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
}

/// Discriminant of [`RecordPayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    TrainingSteps,
    DiagramConfiguration,
    ProgressState,
    AssetBytes,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::TrainingSteps => write!(f, "training_steps"),
            RecordKind::DiagramConfiguration => write!(f, "diagram_configuration"),
            RecordKind::ProgressState => write!(f, "progress_state"),
            RecordKind::AssetBytes => write!(f, "asset_bytes"),
        }
    }
}

/// Tagged union over every record kind the store understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordPayload {
    TrainingSteps(Vec<TrainingStep>),
    DiagramConfiguration(DiagramConfiguration),
    ProgressState(ProgressState),
    AssetBytes(AssetBytes),
}

impl RecordPayload {
    /// Kind of this payload
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::TrainingSteps(_) => RecordKind::TrainingSteps,
            RecordPayload::DiagramConfiguration(_) => RecordKind::DiagramConfiguration,
            RecordPayload::ProgressState(_) => RecordKind::ProgressState,
            RecordPayload::AssetBytes(_) => RecordKind::AssetBytes,
        }
    }
}

/// A value that can be stored in, and typed back out of, a [`RecordPayload`]
pub trait Record: Sized {
    /// Payload kind this type maps to
    const KIND: RecordKind;

    /// Wrap into the tagged payload
    fn into_payload(self) -> RecordPayload;

    /// Unwrap from the tagged payload; hands the payload back on kind mismatch
    fn from_payload(payload: RecordPayload) -> std::result::Result<Self, RecordPayload>;
}

macro_rules! impl_record {
    ($ty:ty, $variant:ident) => {
        impl Record for $ty {
            const KIND: RecordKind = RecordKind::$variant;

            fn into_payload(self) -> RecordPayload {
                RecordPayload::$variant(self)
            }

            fn from_payload(payload: RecordPayload) -> std::result::Result<Self, RecordPayload> {
                match payload {
                    RecordPayload::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

impl_record!(Vec<TrainingStep>, TrainingSteps);
impl_record!(DiagramConfiguration, DiagramConfiguration);
impl_record!(ProgressState, ProgressState);
impl_record!(AssetBytes, AssetBytes);

// =============================================================================
// Cache Record
// =============================================================================

/// Stored envelope around a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Logical key (without namespace prefix)
    pub key: String,
    /// Typed payload
    pub payload: RecordPayload,
    /// When the record was written
    pub stored_at: DateTime<Utc>,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
    /// Schema version the record was written under
    pub schema_version: u32,
}

impl CacheRecord {
    /// Create a record written now under `schema_version`
    pub fn new(
        key: impl Into<String>,
        payload: RecordPayload,
        stored_at: DateTime<Utc>,
        ttl: Duration,
        schema_version: u32,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            stored_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            schema_version,
        }
    }

    /// Time to live
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Instant after which the record is expired; `None` if the TTL reaches
    /// past the representable range, i.e. the record never expires
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.stored_at.checked_add_signed(to_chrono(self.ttl()))
    }

    /// A record is expired once `now - stored_at >= ttl`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    /// Live iff not expired and written under the running schema version
    pub fn is_live(&self, now: DateTime<Utc>, current_version: u32) -> bool {
        self.schema_version == current_version && !self.is_expired(now)
    }
}

/// Serialize `Bytes` as standard base64 text inside JSON records
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
