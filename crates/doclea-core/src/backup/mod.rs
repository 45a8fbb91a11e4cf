//! Export/import and the quality gate (§4.M)
//!
//! Export serializes every memory, document, chunk, relation and pending
//! suggestion into one versioned document. Import restores one under a
//! chosen conflict strategy, optionally re-embedding everything through
//! whatever provider is currently configured. The quality gate exercises
//! the store's retrieval legs against a fixture of golden queries and
//! reports recall/precision against configured thresholds.

mod export;
mod import;
mod quality_gate;

pub use export::{export, ExportData, ExportDocument, ExportMetadata, EXPORT_FORMAT_VERSION};
pub use import::{import, ConflictStrategy, ImportReport};
pub use quality_gate::{run_quality_gate, GoldenQuery, QualityGateConfig, QualityGateReport, QueryDiff};
