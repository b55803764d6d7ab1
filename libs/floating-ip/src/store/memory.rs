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

use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::store::{
    FloatingIp, FloatingIpSpec, FloatingIpStore, IP_TYPE_LABEL, IpType, StoreError,
    StoredFloatingIp,
};

/// Record store keeping everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, StoredFloatingIp>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding previously exported records.
    pub fn from_records(records: Vec<StoredFloatingIp>) -> Self {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|record| (record.name.clone(), record))
                    .collect(),
            ),
        }
    }

    /// Exports all records, sorted by name.
    pub fn records(&self) -> Vec<StoredFloatingIp> {
        self.read().values().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no record.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredFloatingIp>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredFloatingIp>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FloatingIpStore for MemoryStore {
    fn list(&self, ip_type: IpType) -> Result<Vec<FloatingIp>, StoreError> {
        self.read()
            .values()
            .filter(|record| {
                record.labels.get(IP_TYPE_LABEL).map(String::as_str) == Some(ip_type.label_value())
            })
            .map(FloatingIp::try_from)
            .collect()
    }

    fn create(&self, ip_type: IpType, fip: &FloatingIp) -> Result<(), StoreError> {
        tracing::debug!(ip = %fip.ip, key = %fip.key, "create floating ip");
        match self.write().entry(fip.name()) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let name = entry.key().clone();
                entry.insert(StoredFloatingIp {
                    name,
                    labels: BTreeMap::from([(
                        IP_TYPE_LABEL.to_string(),
                        ip_type.label_value().to_string(),
                    )]),
                    resource_version: 1,
                    spec: fip.into(),
                });
                Ok(())
            }
        }
    }

    fn get(&self, name: &str) -> Result<FloatingIp, StoreError> {
        self.read()
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
            .and_then(FloatingIp::try_from)
    }

    fn update(&self, fip: &FloatingIp) -> Result<(), StoreError> {
        tracing::debug!(ip = %fip.ip, key = %fip.key, "update floating ip");
        let name = fip.name();
        let mut records = self.write();
        let record = records
            .get_mut(&name)
            .ok_or(StoreError::NotFound(name))?;
        record.spec = FloatingIpSpec::from(fip);
        record.resource_version += 1;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        tracing::debug!(name, "delete floating ip");
        self.write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
