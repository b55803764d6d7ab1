// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Allocation records of leased floating IPs.
//!
//! One record is kept per leased address, named after the textual address. The record
//! store itself is external; [FloatingIpStore] is the narrow interface the allocator needs
//! from it and [MemoryStore] an in-process implementation.

use core::fmt;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    net::Ipv4Addr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::store::memory::MemoryStore;

mod memory;

/// Label key carrying the [IpType] of a record.
pub const IP_TYPE_LABEL: &str = "ipType";

/// Category of the pools a record was allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpType {
    /// Floating IPs used as the primary address of a workload.
    #[serde(rename = "internalIP")]
    InternalIp,
    /// Floating IPs used as an additional address of a workload.
    #[serde(rename = "secondIP")]
    SecondIp,
}

impl IpType {
    /// Value of the [IP_TYPE_LABEL] label.
    pub fn label_value(&self) -> &'static str {
        match self {
            IpType::InternalIp => "internalIP",
            IpType::SecondIp => "secondIP",
        }
    }
}

impl Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

/// When a leased address is given back to its pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ReleasePolicy {
    /// Released together with the workload.
    #[default]
    PodDelete = 0,
    /// Kept while the owning application exists.
    Immutable = 1,
    /// Never released automatically.
    Never = 2,
}

impl From<ReleasePolicy> for u16 {
    fn from(policy: ReleasePolicy) -> Self {
        policy as u16
    }
}

impl TryFrom<u16> for ReleasePolicy {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReleasePolicy::PodDelete),
            1 => Ok(ReleasePolicy::Immutable),
            2 => Ok(ReleasePolicy::Never),
            other => Err(format!("unknown release policy {other}")),
        }
    }
}

/// A leased floating IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    /// Identity of the workload holding the address.
    pub key: String,
    /// Node subnets the address is usable from, including the key of the pool it was
    /// taken from.
    pub subnets: BTreeSet<String>,
    /// Opaque metadata.
    pub attr: String,
    /// The leased address.
    pub ip: Ipv4Addr,
    /// When the address goes back to its pool.
    pub policy: ReleasePolicy,
    /// Last change of the record.
    pub updated_at: DateTime<Utc>,
}

impl FloatingIp {
    /// Name of the record in the store.
    pub fn name(&self) -> String {
        self.ip.to_string()
    }
}

/// Persisted fields of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingIpSpec {
    pub key: String,
    pub policy: ReleasePolicy,
    pub attribute: String,
    /// Comma separated node subnets.
    pub subnet: String,
    pub update_time: DateTime<Utc>,
}

impl From<&FloatingIp> for FloatingIpSpec {
    fn from(fip: &FloatingIp) -> Self {
        FloatingIpSpec {
            key: fip.key.clone(),
            policy: fip.policy,
            attribute: fip.attr.clone(),
            subnet: fip.subnets.iter().map(String::as_str).collect::<Vec<_>>().join(","),
            update_time: fip.updated_at,
        }
    }
}

/// A record as held by the store, with the metadata the store manages itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFloatingIp {
    /// The textual address.
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Incremented on every write.
    pub resource_version: u64,
    pub spec: FloatingIpSpec,
}

impl TryFrom<&StoredFloatingIp> for FloatingIp {
    type Error = StoreError;

    fn try_from(stored: &StoredFloatingIp) -> Result<Self, Self::Error> {
        let ip = stored.name.parse().map_err(|_| {
            StoreError::Corrupted {
                name: stored.name.clone(),
                reason: "name is not an IPv4 address".to_string(),
            }
        })?;
        Ok(FloatingIp {
            key: stored.spec.key.clone(),
            subnets: stored
                .spec
                .subnet
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            attr: stored.spec.attribute.clone(),
            ip,
            policy: stored.spec.policy,
            updated_at: stored.spec.update_time,
        })
    }
}

/// Record store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this name exists.
    #[error("floating ip {0} already exists")]
    AlreadyExists(String),
    /// No record with this name exists.
    #[error("floating ip {0} not found")]
    NotFound(String),
    /// A stored record cannot be read back.
    #[error("floating ip {name} is corrupted: {reason}")]
    Corrupted {
        /// Record name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Failure of the underlying store.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence of allocation records, keyed by the textual leased address.
///
/// Calls may block on I/O. Callers must not hold a pool lock across them.
pub trait FloatingIpStore: Send + Sync {
    /// Returns all records labelled with `ip_type`.
    fn list(&self, ip_type: IpType) -> Result<Vec<FloatingIp>, StoreError>;

    /// Creates a record, fails if one with the same name exists.
    fn create(&self, ip_type: IpType, fip: &FloatingIp) -> Result<(), StoreError>;

    /// Returns the record with the given name.
    fn get(&self, name: &str) -> Result<FloatingIp, StoreError>;

    /// Replaces key, policy, attribute, subnets and update time of an existing record.
    fn update(&self, fip: &FloatingIp) -> Result<(), StoreError>;

    /// Deletes the record with the given name.
    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

impl<S: FloatingIpStore + ?Sized> FloatingIpStore for Box<S> {
    fn list(&self, ip_type: IpType) -> Result<Vec<FloatingIp>, StoreError> {
        (**self).list(ip_type)
    }

    fn create(&self, ip_type: IpType, fip: &FloatingIp) -> Result<(), StoreError> {
        (**self).create(ip_type, fip)
    }

    fn get(&self, name: &str) -> Result<FloatingIp, StoreError> {
        (**self).get(name)
    }

    fn update(&self, fip: &FloatingIp) -> Result<(), StoreError> {
        (**self).update(fip)
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        (**self).delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str, subnet: &str) -> StoredFloatingIp {
        StoredFloatingIp {
            name: name.to_string(),
            labels: BTreeMap::from([(IP_TYPE_LABEL.to_string(), "internalIP".to_string())]),
            resource_version: 1,
            spec: FloatingIpSpec {
                key: "pod_default_web-0".to_string(),
                policy: ReleasePolicy::Immutable,
                attribute: r#"{"node":"n1"}"#.to_string(),
                subnet: subnet.to_string(),
                update_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            },
        }
    }

    #[test]
    fn should_join_and_split_subnets() {
        let fip = FloatingIp::try_from(&stored("10.0.0.5", "10.1.0.0/24,10.2.0.0/24")).unwrap();
        assert_eq!(fip.ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(
            fip.subnets,
            BTreeSet::from(["10.1.0.0/24".to_string(), "10.2.0.0/24".to_string()])
        );
        assert_eq!(FloatingIpSpec::from(&fip).subnet, "10.1.0.0/24,10.2.0.0/24");

        let fip = FloatingIp::try_from(&stored("10.0.0.5", "")).unwrap();
        assert!(fip.subnets.is_empty());
    }

    #[test]
    fn should_reject_record_with_bad_name() {
        let err = FloatingIp::try_from(&stored("nope", "")).expect_err("should fail");
        assert!(matches!(err, StoreError::Corrupted { name, .. } if name == "nope"));
    }

    #[test]
    fn should_serialize_policy_as_number() {
        let json = serde_json::to_value(stored("10.0.0.5", "")).unwrap();
        assert_eq!(json["spec"]["policy"], 1);
        assert_eq!(json["labels"][IP_TYPE_LABEL], "internalIP");
        assert!(
            serde_json::from_str::<ReleasePolicy>("7").is_err(),
            "unknown policies are rejected"
        );
        assert_eq!(serde_json::from_str::<ReleasePolicy>("2").unwrap(), ReleasePolicy::Never);
    }

    #[test]
    fn should_label_ip_types() {
        assert_eq!(IpType::InternalIp.to_string(), "internalIP");
        assert_eq!(
            serde_json::to_string(&IpType::SecondIp).unwrap(),
            r#""secondIP""#
        );
    }
}
