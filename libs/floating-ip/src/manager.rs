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
//! Floating IP allocation across a set of pools.

use std::{collections::BTreeSet, net::Ipv4Addr, sync::Arc};

use chrono::Utc;
use thiserror::Error;

use crate::{
    pool::{FloatingIpPool, sort_pools},
    store::{FloatingIp, FloatingIpStore, IpType, ReleasePolicy, StoreError},
};

/// Allocation errors.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// No pool has the address available.
    #[error("floating ip {0} is not available")]
    NotAvailable(Ipv4Addr),
    /// The address is available in its pool, so it has no lease to update.
    #[error("floating ip {0} is not allocated")]
    NotAllocated(Ipv4Addr),
    /// No pool has this key.
    #[error("no pool for routable subnet {0}")]
    UnknownPool(String),
    /// The pool has no available address left.
    #[error("pool {0} has no available ip")]
    PoolExhausted(String),
    /// Record store error.
    #[error("record store: {0}")]
    Store(#[from] StoreError),
}

/// Caller supplied fields of an allocation record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lease {
    /// Identity of the workload.
    pub key: String,
    /// Node subnets the address is usable from.
    pub subnets: BTreeSet<String>,
    /// Opaque metadata.
    pub attr: String,
    /// When the address goes back to its pool.
    pub policy: ReleasePolicy,
}

impl Lease {
    /// Creates a lease for the given workload with default policy and no metadata.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    fn into_record(self, ip: Ipv4Addr) -> FloatingIp {
        FloatingIp {
            key: self.key,
            subnets: self.subnets,
            attr: self.attr,
            ip,
            policy: self.policy,
            updated_at: Utc::now(),
        }
    }
}

/// Hands out floating IPs of one [IpType] and keeps their allocation records.
///
/// Allocation takes the address from its pool first and then creates the record, a failed
/// create puts the address back. Release deletes the record first and then returns the
/// address. The record store is only called while no pool lock is held.
///
/// Every record carries the key of the pool it was taken from in its subnets, so pools
/// sharing one floating IP subnet get their own addresses back.
#[derive(Debug)]
pub struct FloatingIpManager<S> {
    ip_type: IpType,
    /// Sorted by routable subnet.
    pools: Vec<Arc<FloatingIpPool>>,
    store: S,
}

impl<S: FloatingIpStore> FloatingIpManager<S> {
    /// Creates a new manager over the given pools.
    pub fn new(ip_type: IpType, mut pools: Vec<Arc<FloatingIpPool>>, store: S) -> Self {
        sort_pools(&mut pools);
        Self {
            ip_type,
            pools,
            store,
        }
    }

    /// The category of addresses this manager hands out.
    pub fn ip_type(&self) -> IpType {
        self.ip_type
    }

    /// All pools, ordered by routable subnet.
    pub fn pools(&self) -> &[Arc<FloatingIpPool>] {
        &self.pools
    }

    /// The pool with the given routable subnet key.
    pub fn pool(&self, key: &str) -> Option<&Arc<FloatingIpPool>> {
        self.pools.iter().find(|pool| pool.key() == key)
    }

    /// The record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Marks every address recorded in the store as allocated.
    ///
    /// Returns the number of records applied. Records whose owning pool cannot be told or
    /// does not have the address available are skipped.
    pub fn restore(&self) -> Result<usize, AllocationError> {
        let records = self.store.list(self.ip_type)?;
        let mut restored = 0;
        for fip in &records {
            if self.owning_pool(fip).is_some_and(|pool| pool.remove_ip(fip.ip)) {
                restored += 1;
            } else {
                tracing::warn!(ip = %fip.ip, key = %fip.key, "Allocated floating ip is in no pool");
            }
        }
        tracing::info!(
            ip_type = %self.ip_type,
            restored,
            total = records.len(),
            "Restored floating ip allocations"
        );
        Ok(restored)
    }

    /// Allocates a specific address.
    pub fn allocate_specific(
        &self,
        ip: Ipv4Addr,
        lease: Lease,
    ) -> Result<FloatingIp, AllocationError> {
        let pool = self
            .pools
            .iter()
            .find(|pool| pool.remove_ip(ip))
            .ok_or(AllocationError::NotAvailable(ip))?;
        self.persist(pool, lease.into_record(ip))
    }

    /// Allocates the lowest available address of the pool with the given key.
    pub fn allocate_in_pool(&self, key: &str, lease: Lease) -> Result<FloatingIp, AllocationError> {
        let pool = self
            .pool(key)
            .ok_or_else(|| AllocationError::UnknownPool(key.to_string()))?;
        let ip = pool
            .take_first()
            .ok_or_else(|| AllocationError::PoolExhausted(key.to_string()))?;
        self.persist(pool, lease.into_record(ip))
    }

    fn persist(
        &self,
        pool: &FloatingIpPool,
        mut fip: FloatingIp,
    ) -> Result<FloatingIp, AllocationError> {
        fip.subnets.insert(pool.key());
        if let Err(e) = self.store.create(self.ip_type, &fip) {
            pool.insert_ip(fip.ip);
            tracing::warn!(ip = %fip.ip, key = %fip.key, "Failed to persist allocation: {e}");
            return Err(e.into());
        }
        tracing::info!(ip = %fip.ip, key = %fip.key, pool = %pool.key(), "Allocated floating ip");
        Ok(fip)
    }

    /// Replaces the record fields of an allocated address. The owning pool stays recorded.
    pub fn update(&self, ip: Ipv4Addr, lease: Lease) -> Result<FloatingIp, AllocationError> {
        let current = match self.store.get(&ip.to_string()) {
            Ok(current) => current,
            Err(StoreError::NotFound(_)) => return Err(AllocationError::NotAllocated(ip)),
            Err(e) => return Err(e.into()),
        };
        let mut fip = lease.into_record(ip);
        if let Some(pool) = self.owning_pool(&current) {
            fip.subnets.insert(pool.key());
        }
        self.store.update(&fip)?;
        Ok(fip)
    }

    /// Deletes the record of an address and returns the address to the pool it was taken
    /// from.
    ///
    /// Returns `false` and leaves all pools untouched if the address has no record. A
    /// failed delete leaves both the record and the pools as they were.
    pub fn release(&self, ip: Ipv4Addr) -> Result<bool, AllocationError> {
        let fip = match self.store.get(&ip.to_string()) {
            Ok(fip) => fip,
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(%ip, "Released floating ip has no record");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        match self.store.delete(&fip.name()) {
            Ok(()) => {}
            // Released concurrently.
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        let Some(pool) = self.owning_pool(&fip) else {
            tracing::warn!(%ip, key = %fip.key, "Released floating ip is in no pool");
            return Ok(false);
        };
        let released = pool.insert_ip(ip);
        if released {
            tracing::info!(%ip, pool = %pool.key(), "Released floating ip");
        }
        Ok(released)
    }

    /// The pool a recorded address was taken from.
    ///
    /// That is the pool whose key the record carries. Records without one fall back to the
    /// pool whose floating IP subnet holds the address, as long as only one does.
    fn owning_pool(&self, fip: &FloatingIp) -> Option<&Arc<FloatingIpPool>> {
        let mut candidates = self
            .pools
            .iter()
            .filter(|pool| pool.subnet().contains(&fip.ip));
        if let Some(pool) = candidates
            .clone()
            .find(|pool| fip.subnets.contains(&pool.key()))
        {
            return Some(pool);
        }
        match (candidates.next(), candidates.next()) {
            (Some(pool), None) => Some(pool),
            _ => None,
        }
    }

    /// Returns the allocations of a workload.
    pub fn by_key(&self, key: &str) -> Result<Vec<FloatingIp>, AllocationError> {
        Ok(self
            .store
            .list(self.ip_type)?
            .into_iter()
            .filter(|fip| fip.key == key)
            .collect())
    }
}
