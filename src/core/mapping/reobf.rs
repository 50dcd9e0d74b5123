use serde::{Deserialize, Serialize};

use super::metadata::MappingMetadata;
use super::namespace::MappingNamespace;
use crate::core::error::MappingError;

/// The namespace the packaged jar is remapped into.
///
/// Selecting a namespace never fails: the bundle that could reject it is not
/// known yet. `validate` checks it against the bundle at packaging time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReobfConfiguration {
    namespace: MappingNamespace,
}

impl Default for ReobfConfiguration {
    fn default() -> Self {
        Self::select_mapping(MappingNamespace::MojangProduction)
    }
}

impl ReobfConfiguration {
    pub fn select_mapping(namespace: MappingNamespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> MappingNamespace {
        self.namespace
    }

    pub fn validate(&self, metadata: &MappingMetadata) -> Result<(), MappingError> {
        if metadata.supports(self.namespace) {
            Ok(())
        } else {
            Err(MappingError::UnsupportedNamespace {
                namespace: self.namespace,
                supported: metadata.supported(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mapping::MappingTable;

    #[test]
    fn selection_is_deferred_until_validation() {
        let config = ReobfConfiguration::select_mapping(MappingNamespace::Mcp);
        assert_eq!(config.namespace(), MappingNamespace::Mcp);

        let mut bundle = MappingMetadata::new(MappingNamespace::MojangProduction, vec![]);
        bundle.add_namespace("OBFUSCATED", Some(MappingTable::new("mojang", "obf")));

        match config.validate(&bundle) {
            Err(MappingError::UnsupportedNamespace { namespace, supported }) => {
                assert_eq!(namespace, MappingNamespace::Mcp);
                assert_eq!(supported, vec!["MOJANG_PRODUCTION", "OBFUSCATED"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(ReobfConfiguration::default().validate(&bundle).is_ok());
    }
}
