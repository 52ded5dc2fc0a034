//! Adaptive merging of HTML sub-resources.
//!
//! This crate decides, from repeated observations of which scripts and
//! stylesheets appear together in documents, which groups are stable enough
//! to be served as one file. It writes the merged files to a
//! content-addressed cache and rewrites documents to reference them.
//!
//! The entry point is [`Squeezer`]; the HTTP integration lives in
//! `squeeze-http`.

mod config;
mod document;
mod element;
mod error;
mod merge;
mod processor;
mod registry;
mod resolve;
mod resource;
mod rewrite;
mod selector;
mod stats;
mod stylesheet;

pub use config::{SqueezeConfig, DEFAULT_MAX_DOCUMENT_BYTES};
pub use document::HtmlDocument;
pub use element::{
    AttrEdit, Element, ElementCapability, ElementFamily, ElementKind, ElementState, ManagedElement,
    STYLE_IMPORT,
};
pub use error::{Result, SqueezeError};
pub use merge::{concatenate, digest, extension_for, MediaTypes, MergeCache, MergedArtifact, MergedBody};
pub use processor::{ProcessedDocument, ResourceResponse, ResponseObservation, Squeezer};
pub use registry::{AxisState, SharedAxis, VaryRegistry};
pub use resolve::{artifact_url, host_url, normalize, DocumentBase};
pub use resource::{
    is_stylesheet_type, mime_essence, RawResource, RawResourceCache, ResourceId, STYLESHEET_TYPE,
};
pub use rewrite::{apply, min_expiry, reference_sequence, RewriteContext, RewriteOutcome};
pub use selector::{slices_by_length, validate_threshold, CandidateSelector, DEFAULT_THRESHOLD};
pub use stats::{AppearanceTracker, Group, GroupStats};
pub use stylesheet::rebase_urls;
