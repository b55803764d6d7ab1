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

use std::{collections::BTreeSet, net::Ipv4Addr, sync::Arc, thread};

use fipam_floating_ip::{
    config::PoolsConfig,
    manager::{AllocationError, FloatingIpManager, Lease},
    pool::FloatingIpPool,
    store::{IpType, MemoryStore},
};
use test_log::test;

const THREADS: usize = 8;

fn manager() -> Arc<FloatingIpManager<MemoryStore>> {
    let config: PoolsConfig = serde_json::from_str(
        r#"{
            "floatingips": [
                {
                    "routableSubnet": "10.180.1.0/24",
                    "ips": ["10.173.13.2-10.173.13.40", "10.173.13.50-10.173.13.90"],
                    "subnet": "10.173.13.0/24",
                    "gateway": "10.173.13.1"
                }
            ]
        }"#,
    )
    .unwrap();
    Arc::new(FloatingIpManager::new(
        IpType::InternalIp,
        config.into_pools().unwrap(),
        MemoryStore::new(),
    ))
}

#[test]
fn concurrent_allocations_never_hand_out_the_same_ip() {
    let manager = manager();
    let pool = manager.pools()[0].clone();
    let initial = pool.ranges();
    let capacity = pool.available() as usize;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = manager.clone();
            thread::spawn(move || {
                let mut ips = Vec::new();
                loop {
                    match manager.allocate_in_pool("10.180.1.0/24", Lease::new(format!("pod-{t}"))) {
                        Ok(fip) => ips.push(fip.ip),
                        Err(AllocationError::PoolExhausted(_)) => return ips,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    let mut allocated = BTreeSet::new();
    for handle in handles {
        for ip in handle.join().unwrap() {
            assert!(allocated.insert(ip), "{ip} allocated twice");
        }
    }
    assert_eq!(allocated.len(), capacity);
    assert_eq!(manager.store().len(), capacity);
    assert!(pool.is_exhausted());

    // Release from several threads at once, each thread a strided share of the addresses.
    let allocated: Arc<Vec<Ipv4Addr>> = Arc::new(allocated.into_iter().collect());
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = manager.clone();
            let allocated = allocated.clone();
            thread::spawn(move || {
                for ip in allocated.iter().skip(t).step_by(THREADS) {
                    assert!(manager.release(*ip).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(manager.store().is_empty());
    assert_eq!(pool.ranges(), initial);
}

#[test]
fn concurrent_specific_allocations_have_one_winner() {
    let manager = manager();
    let target = Ipv4Addr::new(10, 173, 13, 20);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = manager.clone();
            thread::spawn(move || {
                manager
                    .allocate_specific(target, Lease::new(format!("pod-{t}")))
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(manager.store().len(), 1);
    assert!(!manager.pools()[0].contains(target));
}

#[test]
fn pool_survives_restart_through_record_store() {
    let first = manager();
    for key in ["a", "b", "c"] {
        first
            .allocate_in_pool("10.180.1.0/24", Lease::new(key))
            .unwrap();
    }
    let records = first.store().records();
    let before: Vec<_> = first.pools()[0].ranges();

    // Same configuration, fresh pools, records from the previous run.
    let config = PoolsConfig::from(first.pools());
    let pools: Vec<Arc<FloatingIpPool>> = serde_json::from_str::<PoolsConfig>(
        r#"{"floatingips":[{"routableSubnet":"10.180.1.0/24","ips":["10.173.13.2-10.173.13.40","10.173.13.50-10.173.13.90"],"subnet":"10.173.13.0/24","gateway":"10.173.13.1"}]}"#,
    )
    .unwrap()
    .into_pools()
    .unwrap();
    let second = FloatingIpManager::new(
        IpType::InternalIp,
        pools,
        MemoryStore::from_records(records),
    );
    assert_eq!(second.restore().unwrap(), 3);
    assert_eq!(second.pools()[0].ranges(), before);
    assert_eq!(config.floating_ips[0].ips[0], "10.173.13.5-10.173.13.40");
}

#[test]
fn interleaved_release_and_allocation_of_one_ip_stay_consistent() {
    let manager = manager();
    let target = Ipv4Addr::new(10, 173, 13, 20);
    manager
        .allocate_specific(target, Lease::new("pod-0"))
        .unwrap();

    let releaser = {
        let manager = manager.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                manager.release(target).unwrap();
            }
        })
    };
    let allocator = {
        let manager = manager.clone();
        thread::spawn(move || {
            for i in 0..500 {
                match manager.allocate_specific(target, Lease::new(format!("pod-{i}"))) {
                    Ok(_) | Err(AllocationError::NotAvailable(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        })
    };
    releaser.join().unwrap();
    allocator.join().unwrap();

    let recorded = manager
        .store()
        .records()
        .iter()
        .any(|record| record.name == target.to_string());
    assert_ne!(manager.pools()[0].contains(target), recorded);
}

#[test]
fn releasing_unleased_ips_leaves_the_pool_alone() {
    let manager = manager();
    let pool = manager.pools()[0].clone();
    let initial = pool.ranges();

    // Gateway, an address between the configured ranges and an available address.
    for ip in [
        Ipv4Addr::new(10, 173, 13, 1),
        Ipv4Addr::new(10, 173, 13, 45),
        Ipv4Addr::new(10, 173, 13, 2),
    ] {
        assert!(!manager.release(ip).unwrap());
    }
    assert_eq!(pool.ranges(), initial);
    assert_eq!(
        manager
            .allocate_in_pool("10.180.1.0/24", Lease::new("pod-0"))
            .unwrap()
            .ip,
        Ipv4Addr::new(10, 173, 13, 2)
    );
}
