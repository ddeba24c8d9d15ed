pub mod client;
pub mod config;
pub mod di;
pub mod engine;
pub mod error;
pub mod identity;
pub mod logging;
pub mod merge;
pub mod repositories;
pub mod resilience;
pub mod tools;

pub use client::{Orchestrator, RawRecord, SourceStat};
pub use config::{Config, LogFormat};
pub use di::{ServiceContext, ServiceContextBuilder};
pub use engine::AggregationEngine;
pub use error::{Error, ErrorCategory, ErrorResponse, Result};
pub use identity::{classify, parse_identifier, Identifier, IdentifierKind, IdentityResolver};
pub use merge::quality::QualityMetrics;
pub use merge::{CanonicalRecord, MergeEngine, MergePolicy, Strategy};
pub use repositories::{Fingerprint, FingerprintBuilder, ResultCache};
pub use resilience::{RequestScope, RetryPolicy, TimeoutExt};
pub use tools::{
    BatchDetailsInput, BatchSearchInput, DetailsInput, ExportFormat, ExportOptions, QualityInput,
    ReferencesInput, RelationType, RelationsInput, SearchInput,
};
