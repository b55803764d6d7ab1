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
//! Inclusive ranges of IPv4 addresses.

use core::fmt;
use std::{cmp::Ordering, fmt::Display, net::Ipv4Addr, str::FromStr};

use thiserror::Error;

/// Errors that can occur when parsing an [IpRange] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseIpRangeError {
    /// One of the endpoints is not an IPv4 address.
    #[error("invalid ip range {0}")]
    InvalidAddress(String),
    /// The first endpoint is above the last one.
    #[error("ip range start {first} is above its end {last}")]
    Reversed {
        /// First endpoint as written.
        first: Ipv4Addr,
        /// Last endpoint as written.
        last: Ipv4Addr,
    },
}

/// An inclusive range of IPv4 addresses. `first <= last` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    first: Ipv4Addr,
    last: Ipv4Addr,
}

impl IpRange {
    /// Creates a range from its endpoints, `None` if `first > last`.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr) -> Option<Self> {
        (first <= last).then_some(Self { first, last })
    }

    /// Creates a range holding a single address.
    pub fn single(addr: Ipv4Addr) -> Self {
        Self {
            first: addr,
            last: addr,
        }
    }

    /// First address of the range.
    pub fn first(&self) -> Ipv4Addr {
        self.first
    }

    /// Last address of the range.
    pub fn last(&self) -> Ipv4Addr {
        self.last
    }

    /// Returns true if the range holds exactly one address.
    pub fn is_single(&self) -> bool {
        self.first == self.last
    }

    /// Returns true if `first <= addr <= last`.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.first <= addr && addr <= self.last
    }

    /// Number of addresses in the range.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        (distance(self.last, self.first) + 1) as u64
    }

    /// Compare the range to an address.
    pub(crate) fn compare(&self, addr: Ipv4Addr) -> Ordering {
        if self.first > addr {
            Ordering::Greater
        } else if self.last < addr {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    pub(crate) fn set_first(&mut self, first: Ipv4Addr) {
        debug_assert!(first <= self.last);
        self.first = first;
    }

    pub(crate) fn set_last(&mut self, last: Ipv4Addr) {
        debug_assert!(self.first <= last);
        self.last = last;
    }
}

impl Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

impl FromStr for IpRange {
    type Err = ParseIpRangeError;

    // Either a bare address or `first-last`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseIpRangeError::InvalidAddress(s.to_string());
        match s.split_once('-') {
            None => Ok(Self::single(s.trim().parse().map_err(|_| invalid())?)),
            Some((first, last)) => {
                let first: Ipv4Addr = first.trim().parse().map_err(|_| invalid())?;
                let last: Ipv4Addr = last.trim().parse().map_err(|_| invalid())?;
                Self::new(first, last).ok_or(ParseIpRangeError::Reversed { first, last })
            }
        }
    }
}

/// Number of addresses from `b` up to `a`, negative if `a` is below `b`.
pub fn distance(a: Ipv4Addr, b: Ipv4Addr) -> i64 {
    i64::from(a.to_bits()) - i64::from(b.to_bits())
}

/// The address directly above `addr`, `None` at the top of the address space.
pub fn next(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    addr.to_bits().checked_add(1).map(Ipv4Addr::from_bits)
}

/// The address directly below `addr`, `None` at `0.0.0.0`.
pub fn prev(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    addr.to_bits().checked_sub(1).map(Ipv4Addr::from_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn should_format_single_and_multi_address_ranges() {
        assert_eq!(IpRange::single(ip("10.0.0.1")).to_string(), "10.0.0.1");
        assert_eq!(
            IpRange::new(ip("10.0.0.1"), ip("10.0.0.9"))
                .unwrap()
                .to_string(),
            "10.0.0.1-10.0.0.9"
        );
        // A two ended range with equal endpoints still prints as one address.
        assert_eq!(
            IpRange::new(ip("10.0.0.4"), ip("10.0.0.4"))
                .unwrap()
                .to_string(),
            "10.0.0.4"
        );
    }

    #[test]
    fn should_parse_what_it_prints() {
        for text in ["10.0.0.1", "10.0.0.1-10.0.0.9", "0.0.0.0-255.255.255.255"] {
            let range: IpRange = text.parse().expect("valid range");
            assert_eq!(range.to_string(), text);
        }
        let range: IpRange = "10.0.0.2 - 10.0.0.3".parse().expect("whitespace is ignored");
        assert_eq!(range, IpRange::new(ip("10.0.0.2"), ip("10.0.0.3")).unwrap());
    }

    #[test]
    fn should_reject_malformed_text() {
        for text in ["", "10.0.0", "10.0.0.1-", "-10.0.0.1", "10.0.0.1-10.0.0.x", "2001:db8::1"] {
            assert_eq!(
                text.parse::<IpRange>(),
                Err(ParseIpRangeError::InvalidAddress(text.to_string())),
                "{text}"
            );
        }
    }

    #[test]
    fn should_reject_reversed_range() {
        assert_eq!(
            "10.0.0.5-10.0.0.3".parse::<IpRange>(),
            Err(ParseIpRangeError::Reversed {
                first: ip("10.0.0.5"),
                last: ip("10.0.0.3"),
            })
        );
        assert!(IpRange::new(ip("10.0.0.5"), ip("10.0.0.3")).is_none());
    }

    #[test]
    fn should_contain_inclusive_endpoints() {
        let range = IpRange::new(ip("10.0.0.10"), ip("10.0.0.20")).unwrap();
        assert!(range.contains(ip("10.0.0.10")));
        assert!(range.contains(ip("10.0.0.15")));
        assert!(range.contains(ip("10.0.0.20")));
        assert!(!range.contains(ip("10.0.0.9")));
        assert!(!range.contains(ip("10.0.0.21")));
        assert_eq!(range.len(), 11);
    }

    #[test]
    fn should_not_overflow_at_address_space_edges() {
        assert_eq!(next(Ipv4Addr::BROADCAST), None);
        assert_eq!(prev(Ipv4Addr::UNSPECIFIED), None);
        assert_eq!(next(ip("10.0.0.255")), Some(ip("10.0.1.0")));
        assert_eq!(prev(ip("10.0.1.0")), Some(ip("10.0.0.255")));
        assert_eq!(distance(Ipv4Addr::BROADCAST, Ipv4Addr::UNSPECIFIED), u32::MAX as i64);
        assert_eq!(distance(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST), -(u32::MAX as i64));
        assert_eq!(
            IpRange::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST)
                .unwrap()
                .len(),
            1 << 32
        );
    }
}
