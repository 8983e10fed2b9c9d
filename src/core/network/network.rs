use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ordinal::MAX_NETWORKS;
use crate::core::error::{DriverError, Result};

/// Prefix the runtime uses when naming the interface inside the sandbox.
pub const DST_PREFIX: &str = "p2p";

/// Sides of a veth pair.
pub const SIDES: usize = 2;

/// Kernel-visible name of one side of a network's veth pair.
pub fn interface_name(network_ordinal: usize, side: usize) -> String {
    format!("p2p{}-{}", network_ordinal, side)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Endpoint {
    #[serde(rename = "endpoint-id")]
    pub id: String,
    pub ordinal: usize,
    /// Addresses and MAC handed over by the runtime, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<serde_json::Value>,
    #[serde(skip)]
    pub sandbox_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Network {
    #[serde(rename = "network-id")]
    pub id: String,
    pub ordinal: usize,
    #[serde(default)]
    pub endpoints: BTreeMap<String, Endpoint>,
}

impl Endpoint {
    pub fn new(id: &str, ordinal: usize, interface: Option<serde_json::Value>) -> Self {
        Endpoint {
            id: id.to_string(),
            ordinal,
            interface,
            sandbox_key: None,
        }
    }
}

impl Network {
    pub fn new(id: &str, ordinal: usize) -> Self {
        Network {
            id: id.to_string(),
            ordinal,
            endpoints: BTreeMap::new(),
        }
    }

    /// First side of the pair not bound to an endpoint, if any.
    pub fn free_side(&self) -> Option<usize> {
        (0..SIDES).find(|side| !self.endpoints.values().any(|e| e.ordinal == *side))
    }

    pub fn interface_names(&self) -> (String, String) {
        (interface_name(self.ordinal, 0), interface_name(self.ordinal, 1))
    }

    /// Checks a record read back from disk. `record` is the name it was
    /// stored under.
    pub fn validate(&self, record: &str) -> Result<()> {
        if self.id != record {
            return Err(DriverError::malformed(
                record,
                format!("network-id {} does not match record name", self.id),
            ));
        }
        if self.ordinal >= MAX_NETWORKS {
            return Err(DriverError::malformed(
                record,
                format!("ordinal {} out of range", self.ordinal),
            ));
        }
        if self.endpoints.len() > SIDES {
            return Err(DriverError::malformed(
                record,
                format!("{} endpoints", self.endpoints.len()),
            ));
        }

        let mut taken = [false; SIDES];
        for (key, e) in &self.endpoints {
            if *key != e.id {
                return Err(DriverError::malformed(
                    record,
                    format!("endpoint key {} does not match endpoint-id {}", key, e.id),
                ));
            }
            if e.ordinal >= SIDES {
                return Err(DriverError::malformed(
                    record,
                    format!("endpoint {} has ordinal {}", e.id, e.ordinal),
                ));
            }
            if taken[e.ordinal] {
                return Err(DriverError::malformed(
                    record,
                    format!("two endpoints on side {}", e.ordinal),
                ));
            }
            taken[e.ordinal] = true;
        }

        Ok(())
    }
}

/// Ids name state files, so they must be usable as a single path component.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.starts_with('.') || id.contains(['/', '\0'])
    {
        return Err(DriverError::InvalidId(id.to_string()));
    }
    Ok(())
}
