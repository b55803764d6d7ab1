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
//! Allocation records kept in a local JSON file.

use std::{io::ErrorKind, path::Path};

use anyhow::Context;
use fipam_floating_ip::store::{MemoryStore, StoredFloatingIp};

/// Loads the records into a store. A missing file is an empty store.
pub fn load(path: &Path) -> anyhow::Result<MemoryStore> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MemoryStore::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read records file {}", path.display()));
        }
    };
    let records: Vec<StoredFloatingIp> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse records file {}", path.display()))?;
    Ok(MemoryStore::from_records(records))
}

/// Writes all records of the store, replacing the file.
pub fn save(path: &Path, store: &MemoryStore) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(&store.records())?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write records file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, net::Ipv4Addr};

    use chrono::Utc;
    use fipam_floating_ip::store::{FloatingIp, FloatingIpStore, IpType, ReleasePolicy};

    use super::*;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = load(&dir.path().join("records.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn saved_records_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = MemoryStore::new();
        store
            .create(
                IpType::SecondIp,
                &FloatingIp {
                    key: "pod_default_web-0".to_string(),
                    subnets: BTreeSet::new(),
                    attr: String::new(),
                    ip: Ipv4Addr::new(10, 0, 0, 3),
                    policy: ReleasePolicy::Never,
                    updated_at: Utc::now(),
                },
            )
            .unwrap();
        save(&path, &store).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.records(), store.records());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "{").unwrap();
        let err = load(&path).expect_err("should fail");
        assert!(err.to_string().contains("failed to parse records file"));
    }
}
