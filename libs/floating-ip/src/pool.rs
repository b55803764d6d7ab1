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
//! A pool of floating IP addresses.

use core::fmt;
use std::{
    cmp::Ordering,
    fmt::Display,
    net::Ipv4Addr,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use ipnet::Ipv4Net;
use thiserror::Error;

pub use crate::pool::range::{IpRange, ParseIpRangeError, distance, next, prev};

pub mod dto;
mod range;

/// Errors detected while loading a pool from its configuration.
#[derive(Debug, Error)]
pub enum PoolConfigError {
    /// The routable subnet is missing.
    #[error("routable subnet is empty")]
    MissingRoutableSubnet,
    /// The gateway is missing.
    #[error("gateway is empty")]
    MissingGateway,
    /// The floating IP subnet is missing.
    #[error("subnet is empty")]
    MissingSubnet,
    /// A range entry could not be parsed.
    #[error("invalid ip range {0}")]
    InvalidRange(String),
    /// A range is not fully contained in the floating IP subnet.
    #[error("ip range {range} not in subnet {subnet}")]
    RangeNotInSubnet {
        /// Offending range.
        range: IpRange,
        /// Subnet derived from gateway and mask.
        subnet: Ipv4Net,
    },
    /// Two ranges overlap, touch or are not in ascending order.
    #[error("ip range {previous} and {next} can be merged to one or have wrong order")]
    RangeOrder {
        /// The earlier of the two entries.
        previous: String,
        /// The later of the two entries.
        next: String,
    },
    /// The document is not valid JSON or has a malformed field.
    #[error("invalid pool document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A pool of floating IPs reachable from one routable subnet.
///
/// The pool stores the addresses that are still *available* as a list of inclusive ranges.
// Impl Note:
// The ranges are sorted by first address, never overlap and never touch: two ranges
// separated by zero addresses are always merged into one.
// On Allocation - address is removed from the ranges
// On Release    - address is inserted into the ranges
#[derive(Debug)]
pub struct FloatingIpPool {
    /// The node subnet, normalized to its network address.
    routable_subnet: Ipv4Net,
    /// The floating IP subnet, derived from gateway and mask.
    subnet: Ipv4Net,
    gateway: Ipv4Addr,
    /// 0 if the pool has no VLAN.
    vlan: u16,
    ranges: RwLock<Vec<IpRange>>,
}

impl FloatingIpPool {
    /// Creates a new pool.
    ///
    /// # Arguments
    /// * `routable_subnet` - The node subnet the floating IPs are reachable from.
    /// * `gateway` - Gateway of the floating IP subnet.
    /// * `subnet` - Only the mask is used, the network is derived from `gateway`.
    /// * `vlan` - VLAN tag, 0 for none.
    /// * `ranges` - Available ranges, sorted and separated by at least one address.
    pub fn new(
        routable_subnet: Ipv4Net,
        gateway: Ipv4Addr,
        subnet: Ipv4Net,
        vlan: u16,
        ranges: Vec<IpRange>,
    ) -> Result<Self, PoolConfigError> {
        let subnet = Ipv4Net::new_assert(gateway, subnet.prefix_len()).trunc();
        validate(subnet, &ranges)?;
        Ok(Self {
            routable_subnet: routable_subnet.trunc(),
            subnet,
            gateway,
            vlan,
            ranges: RwLock::new(ranges),
        })
    }

    /// The routable subnet, identifying the pool.
    pub fn routable_subnet(&self) -> Ipv4Net {
        self.routable_subnet
    }

    /// The floating IP subnet.
    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    /// The gateway of the floating IP subnet.
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// VLAN tag, 0 if the pool is untagged.
    pub fn vlan(&self) -> u16 {
        self.vlan
    }

    /// Key of this pool, the textual routable subnet.
    pub fn key(&self) -> String {
        self.routable_subnet.to_string()
    }

    /// Numeric value of the routable subnet's first address, pools are ordered by it.
    pub fn ordering_key(&self) -> u32 {
        self.routable_subnet.network().to_bits()
    }

    /// Snapshot of the available ranges.
    pub fn ranges(&self) -> Vec<IpRange> {
        self.read_ranges().clone()
    }

    /// Number of available addresses.
    pub fn available(&self) -> u64 {
        self.read_ranges().iter().map(IpRange::len).sum()
    }

    /// Returns true if no address is available.
    pub fn is_exhausted(&self) -> bool {
        self.read_ranges().is_empty()
    }

    /// Returns true if `addr` is available.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.read_ranges()
            .binary_search_by(|range| range.compare(addr))
            .is_ok()
    }

    /// Returns `addr` to the available addresses.
    ///
    /// Returns `false` and changes nothing if `addr` is outside the subnet or already
    /// available.
    pub fn insert_ip(&self, addr: Ipv4Addr) -> bool {
        if !self.subnet.contains(&addr) {
            return false;
        }
        insert(&mut self.write_ranges(), addr)
    }

    /// Reserves `addr`, removing it from the available addresses.
    ///
    /// Returns `false` and changes nothing if `addr` is outside the subnet or not available.
    pub fn remove_ip(&self, addr: Ipv4Addr) -> bool {
        if !self.subnet.contains(&addr) {
            return false;
        }
        remove(&mut self.write_ranges(), addr)
    }

    /// Reserves the lowest available address.
    pub fn take_first(&self) -> Option<Ipv4Addr> {
        let mut ranges = self.write_ranges();
        let addr = ranges.first()?.first();
        remove(&mut ranges, addr);
        Some(addr)
    }

    // A poisoned lock still guards a consistent list: no mutation panics between two
    // Vec operations.
    fn read_ranges(&self) -> RwLockReadGuard<'_, Vec<IpRange>> {
        self.ranges.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_ranges(&self) -> RwLockWriteGuard<'_, Vec<IpRange>> {
        self.ranges.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Display for FloatingIpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Compares two pools by the first address of their routable subnets.
pub fn compare_pools(a: &FloatingIpPool, b: &FloatingIpPool) -> Ordering {
    a.ordering_key().cmp(&b.ordering_key())
}

/// Sorts pools ascending by routable subnet. Pools with the same first address keep their
/// relative order.
pub fn sort_pools(pools: &mut [Arc<FloatingIpPool>]) {
    pools.sort_by(|a, b| compare_pools(a, b));
}

/// Checks that all ranges lie in `subnet` and are sorted and separated by at least one
/// address.
fn validate(subnet: Ipv4Net, ranges: &[IpRange]) -> Result<(), PoolConfigError> {
    for (i, range) in ranges.iter().enumerate() {
        if !subnet.contains(&range.first()) || !subnet.contains(&range.last()) {
            return Err(PoolConfigError::RangeNotInSubnet {
                range: *range,
                subnet,
            });
        }
        if i > 0 && distance(range.first(), ranges[i - 1].last()) <= 1 {
            return Err(PoolConfigError::RangeOrder {
                previous: ranges[i - 1].to_string(),
                next: range.to_string(),
            });
        }
    }
    Ok(())
}

fn insert(ranges: &mut Vec<IpRange>, addr: Ipv4Addr) -> bool {
    for i in 0..ranges.len() {
        if ranges[i].contains(addr) {
            return false;
        }
        let below = distance(ranges[i].first(), addr);
        if below > 1 {
            // addr first-last
            ranges.insert(i, IpRange::single(addr));
            return true;
        } else if below == 1 {
            // addr-last
            ranges[i].set_first(addr);
            if i > 0 {
                try_merge(ranges, i - 1);
            }
            return true;
        }
        if distance(ranges[i].last(), addr) == -1 {
            // first-addr
            ranges[i].set_last(addr);
            try_merge(ranges, i);
            return true;
        }
    }
    // first-last first-last ... addr
    ranges.push(IpRange::single(addr));
    true
}

/// Merges `ranges[i + 1]` into `ranges[i]` if they touch.
fn try_merge(ranges: &mut Vec<IpRange>, i: usize) {
    if i + 1 >= ranges.len() {
        return;
    }
    if distance(ranges[i + 1].first(), ranges[i].last()) == 1 {
        let last = ranges[i + 1].last();
        ranges[i].set_last(last);
        ranges.remove(i + 1);
    }
}

fn remove(ranges: &mut Vec<IpRange>, addr: Ipv4Addr) -> bool {
    let Ok(i) = ranges.binary_search_by(|range| range.compare(addr)) else {
        return false;
    };
    let range = ranges[i];
    let bits = addr.to_bits();
    // first <= addr <= last, so addr + 1 and addr - 1 only get computed where they exist.
    if range.is_single() {
        ranges.remove(i);
    } else if range.first() == addr {
        ranges[i].set_first(Ipv4Addr::from_bits(bits + 1));
    } else if range.last() == addr {
        ranges[i].set_last(Ipv4Addr::from_bits(bits - 1));
    } else {
        ranges[i].set_last(Ipv4Addr::from_bits(bits - 1));
        let mut upper = range;
        upper.set_first(Ipv4Addr::from_bits(bits + 1));
        ranges.insert(i + 1, upper);
    }
    true
}
