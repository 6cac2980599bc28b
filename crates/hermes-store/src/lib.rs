pub mod config;
pub mod snapshot;

pub use config::StoreConfig;
pub use snapshot::FileSnapshotStore;
