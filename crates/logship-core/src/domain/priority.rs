//! Priorities and persistence policies
//!
//! - [`Priority`] selects the channel (and store partition) a log goes to.
//! - [`InitializationPriority`] orders module start-up; it is unrelated to
//!   [`Priority`].
//! - [`PersistencePolicy`] is a flag set governing eviction under storage pressure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::IngestionError;

// ============================================================================
// Priority
// ============================================================================

/// Delivery priority of a log; one channel exists per value.
///
/// Ordered `Background < Default < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Bulk data that can wait
    Background,
    /// Regular events
    Default,
    /// Crash reports and other urgent data
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

impl Priority {
    /// All priorities, highest first (drain order).
    pub const DRAIN_ORDER: [Priority; 3] = [Priority::High, Priority::Default, Priority::Background];

    /// Stable storage key of the partition
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Background => "background",
            Priority::Default => "default",
            Priority::High => "high",
        }
    }

    /// Dense index, `Background = 0` .. `High = 2`
    pub fn index(&self) -> usize {
        match self {
            Priority::Background => 0,
            Priority::Default => 1,
            Priority::High => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "background" => Ok(Priority::Background),
            "default" => Ok(Priority::Default),
            "high" => Ok(Priority::High),
            other => Err(IngestionError::Configuration(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

// ============================================================================
// InitializationPriority
// ============================================================================

/// Module start-up ordering value. Higher values start first.
///
/// `Max` is reserved for the crash-capture module; the lifecycle coordinator
/// refuses to start when more than one module declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationPriority {
    /// Regular producer modules
    Default = 500,
    /// Modules other producers depend on
    High = 750,
    /// The crash-capture module only
    Max = 999,
}

impl InitializationPriority {
    /// Numeric value of the priority
    pub fn value(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for InitializationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitializationPriority::Default => "default",
            InitializationPriority::High => "high",
            InitializationPriority::Max => "max",
        };
        write!(f, "{}({})", s, self.value())
    }
}

// ============================================================================
// PersistencePolicy
// ============================================================================

/// Durability flags attached to a log at submission time.
///
/// `NORMAL` records may be evicted under storage pressure, oldest first.
/// `CRITICAL` records are never evicted. When both bits are set, `CRITICAL`
/// wins (see [`PersistencePolicy::is_critical`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistencePolicy(u8);

impl PersistencePolicy {
    /// May be dropped under storage pressure
    pub const NORMAL: PersistencePolicy = PersistencePolicy(0x01);
    /// Must survive restarts, evicted never
    pub const CRITICAL: PersistencePolicy = PersistencePolicy(0x02);

    /// Builds a policy from raw bits; unknown bits are dropped and an
    /// empty set becomes `NORMAL`.
    pub fn from_bits(bits: u8) -> Self {
        let bits = bits & 0x03;
        if bits == 0 {
            Self::NORMAL
        } else {
            Self(bits)
        }
    }

    /// Raw bit representation
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether all bits of `other` are set
    pub fn contains(&self, other: PersistencePolicy) -> bool {
        self.0 & other.0 == other.0
    }

    /// Effective durability: `CRITICAL` dominates
    pub fn is_critical(&self) -> bool {
        self.contains(Self::CRITICAL)
    }

    /// Collapses the flag set to the single effective policy
    pub fn effective(&self) -> PersistencePolicy {
        if self.is_critical() {
            Self::CRITICAL
        } else {
            Self::NORMAL
        }
    }
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl std::ops::BitOr for PersistencePolicy {
    type Output = PersistencePolicy;

    fn bitor(self, rhs: Self) -> Self::Output {
        PersistencePolicy(self.0 | rhs.0)
    }
}

impl fmt::Display for PersistencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_critical() {
            f.write_str("critical")
        } else {
            f.write_str("normal")
        }
    }
}
