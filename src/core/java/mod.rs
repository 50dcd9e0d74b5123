mod paths;
pub mod runtime;
mod toolchain;

pub use paths::system_java_candidates;
pub use runtime::{
    probe_java, scan_managed_runtimes, JavaInstallation, ManagedRuntime, RuntimeProvisioner,
    DEFAULT_ADOPTIUM_API,
};
pub use toolchain::{
    RuntimeHandle, ToolchainProvider, ToolchainSelector, ToolchainSpec, MIN_TOOLCHAIN_MAJOR,
};
