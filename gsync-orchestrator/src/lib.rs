//! Profile lifecycle orchestration for the photo-sync fleet.
//!
//! Each profile is an independently scheduled sync worker running in its own
//! container. This crate renders and reads profile manifests, observes live
//! containers (schedule, sync state), and drives start/stop/recreate/delete
//! and the fleet-wide rebuild against a [`gsync_runtime::ContainerRuntime`].
//!
//! The runtime is the source of truth for what exists and what runs; the
//! only state persisted here is manifests and small metadata sidecars.

pub mod browser;
pub mod lifecycle;
pub mod manifest;
pub mod orchestrator;
pub mod profile;
pub mod registry;
pub mod schedule;
pub mod status;
pub mod store;

pub use lifecycle::{LifecycleDriver, OperationReport, RebuildEvent, RebuildSummary, ReportStatus};
pub use orchestrator::Orchestrator;
pub use profile::ProfileConfig;
pub use registry::{ContainerObservation, ContainerStats, ProfileSummary};
pub use status::{KeywordMatcher, LogMatcher, SyncStatus};
pub use store::ProfileMetadata;
