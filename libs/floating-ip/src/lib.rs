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
//! # Floating IP
//!
//! Manage pools of floating IPs handed out to containers.
//!
//! A [pool::FloatingIpPool] tracks the addresses of one routable subnet that are still
//! available, as a sorted list of merged [pool::IpRange]s. Pools are loaded from
//! [config::PoolsConfig].
//!
//! The [manager::FloatingIpManager] allocates and releases addresses across pools and
//! persists one allocation record per leased address through a [store::FloatingIpStore].

pub mod config;
pub mod manager;
pub mod pool;
pub mod store;
