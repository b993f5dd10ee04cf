//! Schema Relay
//!
//! Schema-versioned binary records for one record type, read across versions
//! without migrating stored data.
//!
//! ## Features
//!
//! - **Binary Codec**: Compact positional encoding driven by a schema
//! - **Schema Resolution**: Writer/reader plans that fill defaults and skip removed fields
//! - **Immutable Registry**: Append-only schema versions with SHA256 fingerprints
//! - **Record Store**: In-memory records kept in the encoding they were written with
//! - **Bounded Relay**: FIFO buffer that evicts the oldest message and feeds a background consumer
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────────┐
//!             │  SchemaRegistry  │── plan cache (writer, reader)
//!             └────────┬─────────┘
//!                      │ Arc
//!        ┌─────────────┼──────────────┐
//!        ▼             ▼              ▼
//!   RecordStore     Codec          Relay ──▶ Consumer thread
//!   (id → bytes)  (encode/decode)  (VecDeque, capacity N)
//!        └──────── RecordService ─────┘
//! ```

pub mod codec;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod relay;
pub mod schema;
pub mod service;
pub mod store;
pub mod value;
pub mod version;

pub use codec::{decode, encode, Codec, EncodedMessage, TrailingData};
pub use compatibility::{
    decode_resolved, resolve, ChangeType, CompatibilityChecker, CompatibilityReport, FieldAction,
    ResolutionPlan, SchemaChange,
};
pub use config::Settings;
pub use error::{DecodeError, EncodeError, Error, Result, SchemaError, StoreError};
pub use fingerprint::Fingerprint;
pub use registry::{SchemaEntry, SchemaRegistry};
pub use relay::{Consumer, ConsumerHandle, ConsumerStats, Relay, RelayStats};
pub use schema::{Field, Schema};
pub use service::RecordService;
pub use store::{ListedRecord, RecordStore};
pub use value::{FieldType, Record, Value};
pub use version::SchemaVersion;
