// crates/intake-gate-core/src/core/mod.rs
// ============================================================================
// Module: Intake Gate Core Types
// Description: Canonical submission, routing, and outcome structures.
// Purpose: Provide stable, serializable types for the ingestion pipeline.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the normalized submission record, the dedup identity
//! model, the table routing allow-list, and the outcome vocabulary reported
//! to transports. These types are the canonical source of truth for any
//! derived API surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod dedup;
pub mod identifiers;
pub mod normalize;
pub mod outcome;
pub mod routing;
pub mod submission;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dedup::derive_dedup_key;
pub use identifiers::DedupKey;
pub use identifiers::KeyKind;
pub use identifiers::LeadId;
pub use normalize::normalize_payload;
pub use outcome::IngestOutcome;
pub use outcome::ValidationError;
pub use routing::DedupPolicy;
pub use routing::RoutingError;
pub use routing::RoutingTable;
pub use routing::ServerFields;
pub use routing::TableRoute;
pub use submission::LeadFields;
pub use submission::SubmissionRequest;
pub use submission::canonicalize_phone;
pub use submission::sanitize_field;
