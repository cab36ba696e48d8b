//! Datasets, items and the pipeline stage machine.
//!
//! A [`Dataset`] is an ordered, append-only collection of [`Item`]s plus its
//! pipeline state. Items are addressed by [`ItemId`] and carry the ingestion
//! `ordinal` used for deterministic tie-breaks throughout the pipeline.

pub mod lifecycle;
pub mod media;
pub mod types;

pub use lifecycle::StageMachine;
pub use media::{MediaFormat, Modality};
pub use types::{DataSourceType, Dataset, DatasetId, Item, ItemDescriptor, ItemId, PipelineStage};
