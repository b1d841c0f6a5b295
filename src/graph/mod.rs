//! Traceability graph of requirements and test cases
//!
//! Pure Rust implementation on petgraph; persistence lives in
//! [`crate::storage`].

pub mod store;
pub mod store_models;
pub mod traits;

pub use store::{ArtifactGraph, GraphSnapshot, GraphState};
pub use store_models::{
    ArtifactBundle, ArtifactNode, GraphExport, ImportSummary, LinkRelation, LinkSpec,
    TestCaseRecord, TraceLink,
};
pub use traits::TraceQuery;
