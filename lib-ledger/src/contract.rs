//! Persisted contract objects.

use serde::{Deserialize, Serialize};

use lib_sandbox::{DataRecord, MethodSource};
use lib_types::{Address, GroupId};

use crate::constants::CONTRACT_METHOD_SEPARATOR;

/// A deployed contract as the ledger persists it: its address, a snapshot of
/// its data fields, the source of its exported methods joined by
/// [`CONTRACT_METHOD_SEPARATOR`], and the witness group it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    address: Address,
    data: DataRecord,
    code: String,
    group_id: GroupId,
}

impl Contract {
    pub fn new(address: Address, data: DataRecord, code: String, group_id: GroupId) -> Self {
        Self {
            address,
            data,
            code,
            group_id,
        }
    }

    /// Assemble from captured method sources
    pub fn from_methods(
        address: Address,
        data: DataRecord,
        methods: &[MethodSource],
        group_id: GroupId,
    ) -> Self {
        let code = methods
            .iter()
            .map(|m| m.source.as_str())
            .collect::<Vec<_>>()
            .join(CONTRACT_METHOD_SEPARATOR);
        Self::new(address, data, code, group_id)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn data(&self) -> &DataRecord {
        &self.data
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replace the persisted data snapshot (after a successful invocation)
    pub(crate) fn set_data(&mut self, data: DataRecord) {
        self.data = data;
    }

    /// Split the stored code back into method sources. Names are the leading
    /// identifier of each chunk; chunks are re-validated by the sandbox
    /// before execution.
    pub fn method_sources(&self) -> Vec<MethodSource> {
        if self.code.is_empty() {
            return Vec::new();
        }
        self.code
            .split(CONTRACT_METHOD_SEPARATOR)
            .map(|chunk| {
                let trimmed = chunk.trim_start();
                let name: String = trimmed
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                MethodSource {
                    name,
                    source: chunk.to_string(),
                }
            })
            .collect()
    }

    /// Whether the stored code declares the given method
    pub fn has_method(&self, name: &str) -> bool {
        self.method_sources().iter().any(|m| m.name == name)
    }
}
