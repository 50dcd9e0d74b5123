mod metadata;
mod namespace;
mod reobf;
mod tiny;

pub use metadata::MappingMetadata;
pub use namespace::MappingNamespace;
pub use reobf::ReobfConfiguration;
pub use tiny::{ClassMapping, MappingTable, MemberKey};
