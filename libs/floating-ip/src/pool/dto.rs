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
//! Configuration document of a floating IP pool.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::pool::{FloatingIpPool, IpRange, ParseIpRangeError, PoolConfigError};

/// A floating IP pool as it appears in configuration.
///
/// ```json
/// {
///   "routableSubnet": "10.180.1.0/24",
///   "ips": ["10.173.13.2", "10.173.13.10-10.173.13.20"],
///   "subnet": "10.173.13.0/24",
///   "gateway": "10.173.13.1",
///   "vlan": 2
/// }
/// ```
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FloatingIpPoolDto {
    /// The node subnet.
    pub routable_subnet: Option<Ipv4Net>,
    /// Available addresses, either `a.b.c.d` or `a.b.c.d-e.f.g.h`, in ascending order.
    #[serde(default)]
    pub ips: Vec<String>,
    /// The floating IP subnet. Only its mask is kept.
    pub subnet: Option<Ipv4Net>,
    /// Gateway of the floating IP subnet.
    pub gateway: Option<Ipv4Addr>,
    /// VLAN tag, omitted when 0.
    #[serde(default, skip_serializing_if = "is_untagged")]
    pub vlan: u16,
}

fn is_untagged(vlan: &u16) -> bool {
    *vlan == 0
}

impl From<&FloatingIpPool> for FloatingIpPoolDto {
    fn from(pool: &FloatingIpPool) -> Self {
        FloatingIpPoolDto {
            routable_subnet: Some(pool.routable_subnet),
            ips: pool.ranges().iter().map(IpRange::to_string).collect(),
            subnet: Some(pool.subnet),
            gateway: Some(pool.gateway),
            vlan: pool.vlan,
        }
    }
}

impl TryFrom<FloatingIpPoolDto> for FloatingIpPool {
    type Error = PoolConfigError;

    fn try_from(value: FloatingIpPoolDto) -> Result<Self, Self::Error> {
        let routable_subnet = value
            .routable_subnet
            .ok_or(PoolConfigError::MissingRoutableSubnet)?;
        let gateway = value.gateway.ok_or(PoolConfigError::MissingGateway)?;
        let subnet = value.subnet.ok_or(PoolConfigError::MissingSubnet)?;
        let ranges = value
            .ips
            .iter()
            .map(|text| parse_range(text))
            .collect::<Result<Vec<_>, _>>()?;

        FloatingIpPool::new(routable_subnet, gateway, subnet, value.vlan, ranges)
    }
}

fn parse_range(text: &str) -> Result<IpRange, PoolConfigError> {
    text.parse().map_err(|err| {
        match err {
            ParseIpRangeError::InvalidAddress(_) => PoolConfigError::InvalidRange(text.to_string()),
            ParseIpRangeError::Reversed { first, last } => {
                PoolConfigError::RangeOrder {
                    previous: first.to_string(),
                    next: last.to_string(),
                }
            }
        }
    })
}

impl FloatingIpPool {
    /// Decodes and validates a pool from its JSON document.
    pub fn from_json(json: &str) -> Result<Self, PoolConfigError> {
        let dto: FloatingIpPoolDto = serde_json::from_str(json)?;
        dto.try_into()
    }

    /// Encodes the pool as its JSON document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&FloatingIpPoolDto::from(self))
    }
}
