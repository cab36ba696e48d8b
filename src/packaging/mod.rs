//! Packaging of refined datasets.
//!
//! A [`DataPackage`] is built from the latest [`crate::pipeline::RefinementRecord`]
//! of a `Refined` dataset: the manifest lists the passed items and the
//! provenance log traces ingestion, every refinement run and packaging.

pub mod package;
pub mod service;

pub use package::{DataPackage, Manifest, ManifestEntry, ProvenanceEntry, ProvenanceStep};
pub use service::{PackageRequest, PackageService};
