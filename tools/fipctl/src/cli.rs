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
//! fipctl CLI options.

use std::{net::Ipv4Addr, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use fipam_floating_ip::store::{IpType, ReleasePolicy};

/// Inspect floating IP pools and exercise allocations against a local record file.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Opts {
    /// Top-level subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Logging options
    #[command(flatten)]
    pub logging: LoggingOptions,

    /// Pool options
    #[command(flatten)]
    pub pools: PoolOptions,
}

/// Logging options.
#[derive(Debug, Args)]
pub struct LoggingOptions {
    /// Log to stderr.
    #[arg(long, global = true, default_value = "true")]
    pub stderr: bool,

    /// Directory for the log file.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

/// Where the pools and their allocation records come from.
#[derive(Debug, Args)]
pub struct PoolOptions {
    /// Pool configuration file (`{"floatingips": [...]}`).
    #[arg(long, global = true, default_value = "floatingip.json")]
    pub config: PathBuf,

    /// File holding the allocation records. Missing means no allocation.
    #[arg(long, global = true, default_value = "floatingip-records.json")]
    pub records: PathBuf,

    /// Category of the addresses.
    #[arg(long, global = true, value_enum, default_value_t = IpTypeArg::Internal)]
    pub ip_type: IpTypeArg,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate the pool configuration.
    Check,
    /// Print the pools with their currently available ranges.
    Show,
    /// Allocate an address and record the allocation.
    Allocate {
        /// Identity of the workload.
        #[arg(long)]
        key: String,

        /// Allocate this address.
        #[arg(long, conflicts_with = "pool", required_unless_present = "pool")]
        ip: Option<Ipv4Addr>,

        /// Allocate the lowest available address of the pool with this routable subnet.
        #[arg(long)]
        pool: Option<String>,

        /// Node subnets the address is usable from.
        #[arg(long, value_delimiter = ',')]
        subnets: Vec<String>,

        /// Opaque metadata.
        #[arg(long, default_value = "")]
        attr: String,

        /// Release policy.
        #[arg(long, value_enum, default_value_t = PolicyArg::PodDelete)]
        policy: PolicyArg,
    },
    /// Release an address and delete its record.
    Release {
        /// The address to release.
        #[arg(long)]
        ip: Ipv4Addr,
    },
    /// List the allocations of a workload.
    Query {
        /// Identity of the workload.
        #[arg(long)]
        key: String,
    },
}

/// Category of addresses on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IpTypeArg {
    Internal,
    Second,
}

impl From<IpTypeArg> for IpType {
    fn from(value: IpTypeArg) -> Self {
        match value {
            IpTypeArg::Internal => IpType::InternalIp,
            IpTypeArg::Second => IpType::SecondIp,
        }
    }
}

/// Release policy on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    PodDelete,
    Immutable,
    Never,
}

impl From<PolicyArg> for ReleasePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::PodDelete => ReleasePolicy::PodDelete,
            PolicyArg::Immutable => ReleasePolicy::Immutable,
            PolicyArg::Never => ReleasePolicy::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn allocate_needs_ip_or_pool() {
        assert!(Opts::try_parse_from(["fipctl", "allocate", "--key", "a"]).is_err());
        assert!(
            Opts::try_parse_from([
                "fipctl",
                "allocate",
                "--key",
                "a",
                "--ip",
                "10.0.0.1",
                "--pool",
                "10.180.1.0/24"
            ])
            .is_err()
        );

        let opts = Opts::try_parse_from([
            "fipctl",
            "allocate",
            "--key",
            "a",
            "--pool",
            "10.180.1.0/24",
            "--subnets",
            "10.180.1.0/24,10.180.2.0/24",
            "--records",
            "/tmp/records.json",
        ])
        .unwrap();
        assert_eq!(opts.pools.records, PathBuf::from("/tmp/records.json"));
        let Commands::Allocate { subnets, pool, .. } = opts.command else {
            panic!("expected allocate");
        };
        assert_eq!(subnets, ["10.180.1.0/24", "10.180.2.0/24"]);
        assert_eq!(pool.as_deref(), Some("10.180.1.0/24"));
    }
}
