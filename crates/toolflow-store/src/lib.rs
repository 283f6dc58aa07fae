mod error;
mod fs_store;
mod manager;
mod store;

pub use error::StoreError;
pub use fs_store::FsFlowStore;
pub use manager::{DEFAULT_CATEGORY, FlowConfigManager, StoreConfig};
pub use store::{FlowStore, StoredFlow};
