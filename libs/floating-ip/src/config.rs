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
//! Floating IP pool configuration file.

use std::{collections::BTreeSet, path::Path, sync::Arc};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::pool::{FloatingIpPool, dto::FloatingIpPoolDto};

/// The pools of one node, as configured.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsConfig {
    #[serde(rename = "floatingips", default)]
    pub floating_ips: Vec<FloatingIpPoolDto>,
}

impl PoolsConfig {
    /// Reads the configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pool config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse pool config {}", path.display()))
    }

    /// Decodes all pools. A single invalid pool rejects the whole configuration.
    pub fn into_pools(self) -> anyhow::Result<Vec<Arc<FloatingIpPool>>> {
        let mut keys = BTreeSet::new();
        self.floating_ips
            .into_iter()
            .enumerate()
            .map(|(i, dto)| -> anyhow::Result<Arc<FloatingIpPool>> {
                let pool = FloatingIpPool::try_from(dto)
                    .with_context(|| format!("invalid floating ip pool #{i}"))?;
                anyhow::ensure!(
                    keys.insert(pool.key()),
                    "invalid floating ip pool #{i}: routable subnet {} configured twice",
                    pool.key()
                );
                Ok(Arc::new(pool))
            })
            .collect()
    }
}

impl From<&[Arc<FloatingIpPool>]> for PoolsConfig {
    fn from(pools: &[Arc<FloatingIpPool>]) -> Self {
        PoolsConfig {
            floating_ips: pools
                .iter()
                .map(|pool| FloatingIpPoolDto::from(pool.as_ref()))
                .collect(),
        }
    }
}
