// SPDX-License-Identifier: MIT

//! Resource requests, reservations, and the parsers behind them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::job::JobId;

/// Errors from resource parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("invalid size: {0}")]
    InvalidSize(String),
    #[error("invalid cpu core mask: {0}")]
    InvalidMask(String),
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("invalid cpu percent: {0} (expected 1..=10000)")]
    InvalidCpuPercent(u32),
}

/// Parse a size string of the form `<number>(B|KB|MB|GB|TB)`.
///
/// Multipliers are binary (KB = 1024 bytes), matching what the sandbox
/// writes into `memory.max`.
pub fn parse_size(s: &str) -> Result<u64, ResourceError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ResourceError::InvalidSize(s.to_string()))?;
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(ResourceError::InvalidSize(s.to_string()));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| ResourceError::InvalidSize(s.to_string()))?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        _ => return Err(ResourceError::InvalidSize(s.to_string())),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| ResourceError::InvalidSize(s.to_string()))
}

/// Parse a human duration string (`"90s"`, `"5m"`, `"1h30m"`).
pub fn parse_duration(s: &str) -> Result<Duration, ResourceError> {
    humantime::parse_duration(s.trim()).map_err(|_| ResourceError::InvalidDuration(s.to_string()))
}

/// A set of CPU core indices, e.g. parsed from `"0-3,5"`.
///
/// Renders back to the same range syntax, which is also what
/// `cpuset.cpus` accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuSet(BTreeSet<u32>);

impl CpuSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cores(cores: impl IntoIterator<Item = u32>) -> Self {
        Self(cores.into_iter().collect())
    }

    /// Parse a mask string like `"0-3,5"`. Empty input is an empty set.
    pub fn parse(s: &str) -> Result<Self, ResourceError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let mut cores = BTreeSet::new();
        for part in s.split(',') {
            let part = part.trim();
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: u32 = lo
                        .trim()
                        .parse()
                        .map_err(|_| ResourceError::InvalidMask(s.to_string()))?;
                    let hi: u32 = hi
                        .trim()
                        .parse()
                        .map_err(|_| ResourceError::InvalidMask(s.to_string()))?;
                    if lo > hi {
                        return Err(ResourceError::InvalidMask(s.to_string()));
                    }
                    cores.extend(lo..=hi);
                }
                None => {
                    let core: u32 = part
                        .parse()
                        .map_err(|_| ResourceError::InvalidMask(s.to_string()))?;
                    cores.insert(core);
                }
            }
        }
        Ok(Self(cores))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, core: u32) -> bool {
        self.0.contains(&core)
    }

    pub fn insert(&mut self, core: u32) {
        self.0.insert(core);
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// True when no core of `self` appears in `other`.
    pub fn is_disjoint(&self, other: &CpuSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    /// True when every core of `self` appears in `other`.
    pub fn is_subset(&self, other: &CpuSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl fmt::Display for CpuSet {
    /// Render as compact ranges: `{0,1,2,3,5}` becomes `"0-3,5"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut iter = self.0.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end = iter.next().unwrap_or(end);
            }
            if !first {
                write!(f, ",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for CpuSet {
    type Error = ResourceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CpuSet> for String {
    fn from(set: CpuSet) -> String {
        set.to_string()
    }
}

/// Resource limits requested for a job. Zero means "no limit" for the
/// scalar fields and "no pinning" for the core mask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Aggregate CPU percent, 100 per core (e.g. 250 = 2.5 cores).
    #[serde(default)]
    pub max_cpu_percent: u32,
    /// Explicit core pinning. When set, reservation must match exactly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<CpuSet>,
    #[serde(default)]
    pub max_memory_bytes: u64,
    #[serde(default)]
    pub max_io_bps: u64,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default)]
    pub gpu_memory_mb: u64,
}

impl ResourceRequest {
    /// Number of cores the ledger must set aside for this request.
    ///
    /// An explicit mask wins; otherwise derived from the CPU percent,
    /// rounded up. Zero means the job is not pinned to any core.
    pub fn cores_needed(&self) -> u32 {
        if let Some(mask) = &self.cpu_cores {
            return mask.len() as u32;
        }
        self.max_cpu_percent.div_ceil(100)
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.max_cpu_percent > 10_000 {
            return Err(ResourceError::InvalidCpuPercent(self.max_cpu_percent));
        }
        Ok(())
    }
}

/// A job's hold on host resources, created atomically by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub job_id: JobId,
    pub cores: CpuSet,
    pub memory_bytes: u64,
    pub gpu_indices: BTreeSet<u32>,
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
