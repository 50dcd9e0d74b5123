mod store;

pub use store::{ArtifactCache, CachedFile};
