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
//! Command line tool for floating IP pools.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fipam_floating_ip::{
    config::PoolsConfig,
    manager::{FloatingIpManager, Lease},
    pool::FloatingIpPool,
    store::MemoryStore,
};

use crate::cli::{Commands, Opts, PoolOptions};

mod cli;
mod records;

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let _guards =
        fipam_observability::setup_tracing(opts.logging.log_dir.as_ref(), opts.logging.stderr)
            .context("failed to set up logging")?;

    let pools = PoolsConfig::load(&opts.pools.config)?.into_pools()?;
    match opts.command {
        Commands::Check => run_check(&pools),
        Commands::Show => run_show(&restore(pools, &opts.pools)?),
        Commands::Allocate {
            key,
            ip,
            pool,
            subnets,
            attr,
            policy,
        } => {
            let manager = restore(pools, &opts.pools)?;
            let lease = Lease {
                key,
                subnets: subnets.into_iter().collect(),
                attr,
                policy: policy.into(),
            };
            let fip = match (ip, pool) {
                (Some(ip), _) => manager.allocate_specific(ip, lease)?,
                (None, Some(pool)) => manager.allocate_in_pool(&pool, lease)?,
                (None, None) => anyhow::bail!("either --ip or --pool is required"),
            };
            records::save(&opts.pools.records, manager.store())?;
            println!("{}", fip.ip);
            Ok(())
        }
        Commands::Release { ip } => {
            let manager = restore(pools, &opts.pools)?;
            let released = manager.release(ip)?;
            records::save(&opts.pools.records, manager.store())?;
            if released {
                println!("released {ip}");
            } else {
                println!("{ip} is not allocated");
            }
            Ok(())
        }
        Commands::Query { key } => {
            let manager = restore(pools, &opts.pools)?;
            for fip in manager.by_key(&key)? {
                println!(
                    "{}\t{}\t{:?}",
                    fip.ip,
                    fip.updated_at.to_rfc3339(),
                    fip.policy
                );
            }
            Ok(())
        }
    }
}

fn run_check(pools: &[Arc<FloatingIpPool>]) -> anyhow::Result<()> {
    for pool in pools {
        println!(
            "{}\tsubnet={} gateway={} vlan={} available={}",
            pool.key(),
            pool.subnet(),
            pool.gateway(),
            pool.vlan(),
            pool.available()
        );
    }
    println!("{} pools ok", pools.len());
    Ok(())
}

fn run_show(manager: &FloatingIpManager<MemoryStore>) -> anyhow::Result<()> {
    let config = PoolsConfig::from(manager.pools());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Creates the manager and replays the recorded allocations into its pools.
fn restore(
    pools: Vec<Arc<FloatingIpPool>>,
    opts: &PoolOptions,
) -> anyhow::Result<FloatingIpManager<MemoryStore>> {
    let store = records::load(&opts.records)?;
    let manager = FloatingIpManager::new(opts.ip_type.into(), pools, store);
    let restored = manager.restore()?;
    tracing::debug!(restored, "replayed allocation records");
    Ok(manager)
}
