//! Dev bundles: the platform API, its libraries and mapping tables,
//! published as one versioned zip.

mod config;
mod materializer;
mod request;

pub use config::{read_bundle, BundleConfig, BundleContents, CONFIG_ENTRY};
pub use materializer::{DevBundle, DevBundleMaterializer};
pub use request::{DevBundleRequest, DEV_BUNDLE_ARTIFACT, DEV_BUNDLE_GROUP};
