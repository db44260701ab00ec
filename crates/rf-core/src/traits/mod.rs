//! Collaborator trait definitions

mod snapshot;

pub use snapshot::SnapshotProvider;
