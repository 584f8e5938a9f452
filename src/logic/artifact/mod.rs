//! Artifact Module - remediation artifact generation
//!
//! # Components
//! - `types.rs`: Artifact (body + provenance), Generation
//! - `template.rs`: `{{FIELD}}` templates, typed field map, template store
//! - `generator.rs`: idempotent generation under the index lock

pub mod types;
pub mod template;
pub mod generator;

#[cfg(test)]
mod tests;

pub use types::{Artifact, Generation};
pub use template::{default_templates, Field, FieldMap, Template, TemplateStore};
pub use generator::{slugify, ArtifactGenerator, GenerationRequest};
