//! Risk levels and deformation types.
//!
//! The warning scale follows the four-tier early-warning convention where
//! level 1 is the most severe (red) and level 4 the least severe (blue),
//! with 0 meaning normal. The numbering is kept for compatibility, but all
//! comparisons go through [`RiskLevel::severity`] so call sites never
//! compare raw level numbers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Standardized deformation warning level.
///
/// Serializes as its compatibility number (`0`-`4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(into = "u8", try_from = "u8")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    /// Level 0: below every warning threshold
    Normal = 0,
    /// Level 1 (I): red, highest severity
    Red = 1,
    /// Level 2 (II): orange
    Orange = 2,
    /// Level 3 (III): yellow
    Yellow = 3,
    /// Level 4 (IV): blue, lowest warning
    Blue = 4,
}

impl RiskLevel {
    /// Returns the compatibility number of this level (`0`-`4`).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a level from its compatibility number.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 0-4.
    pub const fn from_value(value: u8) -> Result<Self, InvalidRiskLevelError> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Red),
            2 => Ok(Self::Orange),
            3 => Ok(Self::Yellow),
            4 => Ok(Self::Blue),
            _ => Err(InvalidRiskLevelError { value }),
        }
    }

    /// Returns the intuitive severity rank: 0 for normal up to 4 for red.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Blue => 1,
            Self::Yellow => 2,
            Self::Orange => 3,
            Self::Red => 4,
        }
    }

    /// Returns the level with the given severity rank, saturating at red.
    #[must_use]
    pub const fn from_severity(severity: u8) -> Self {
        match severity {
            0 => Self::Normal,
            1 => Self::Blue,
            2 => Self::Yellow,
            3 => Self::Orange,
            _ => Self::Red,
        }
    }

    /// Returns `true` if `self` is strictly more severe than `other`.
    #[must_use]
    pub const fn is_more_severe_than(self, other: Self) -> bool {
        self.severity() > other.severity()
    }

    /// Returns whichever of the two levels is more severe.
    #[must_use]
    pub const fn most_severe(self, other: Self) -> Self {
        if other.is_more_severe_than(self) {
            other
        } else {
            self
        }
    }

    /// Returns `true` for any level other than [`RiskLevel::Normal`].
    #[must_use]
    pub const fn is_warning(self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// Human-readable label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Red => "Level I (red)",
            Self::Orange => "Level II (orange)",
            Self::Yellow => "Level III (yellow)",
            Self::Blue => "Level IV (blue)",
        }
    }

    /// Returns all variants ordered from normal to most severe.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Normal, Self::Blue, Self::Yellow, Self::Orange, Self::Red]
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> Self {
        level.value()
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = InvalidRiskLevelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Error returned when attempting to create a [`RiskLevel`] from an invalid
/// numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRiskLevelError {
    /// The invalid level value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidRiskLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid risk level {}: expected 0-4", self.value)
    }
}

impl std::error::Error for InvalidRiskLevelError {}

/// Kind of deformation observed at the point of maximum displacement.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeformationType {
    /// Movement within GPS noise
    Noise,
    /// No significant movement
    None,
    /// Predominantly horizontal movement
    Horizontal,
    /// Predominantly vertical movement
    Vertical,
    /// Significant horizontal and vertical movement together
    Combined,
    /// Movement that fits no single axis
    Rotation,
}

impl DeformationType {
    /// Returns the numeric type code (`-1` for noise through `4` for
    /// rotation).
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Noise => -1,
            Self::None => 0,
            Self::Horizontal => 1,
            Self::Vertical => 2,
            Self::Combined => 3,
            Self::Rotation => 4,
        }
    }

    /// Returns `true` if the type represents real deformation (code > 0).
    #[must_use]
    pub const fn is_detected(self) -> bool {
        self.code() > 0
    }

    /// Returns `true` for the complex movement types that escalate risk
    /// further.
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Combined | Self::Rotation)
    }
}
