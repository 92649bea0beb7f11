//! Degrees-minutes-direction coordinates as written by the scanning device.
//!
//! The device writes each axis as `"<deg> град <min> мин <dir>"`, for example
//! `"54 град 39.54229 мин СШ"`. There is no seconds component; minutes carry
//! the fractional part.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::CovError;

const DEGREE_MARKER: &str = "град";
const MINUTE_MARKER: &str = "мин";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Device token for this direction.
    pub fn token(self) -> &'static str {
        match self {
            Direction::North => "СШ",
            Direction::South => "ЮШ",
            Direction::East => "ВД",
            Direction::West => "ЗД",
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Direction::South | Direction::West)
    }
}

impl FromStr for Direction {
    type Err = CovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "СШ" => Ok(Direction::North),
            "ЮШ" => Ok(Direction::South),
            "ВД" => Ok(Direction::East),
            "ЗД" => Ok(Direction::West),
            other => Err(CovError::Format(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DmsCoordinate {
    /// Whole degrees; always integral when produced by the parser.
    pub degrees: f64,
    pub minutes: f64,
    pub direction: Direction,
}

impl DmsCoordinate {
    /// Signed decimal degrees; south and west are negative.
    pub fn to_decimal(&self) -> f64 {
        let value = self.degrees + self.minutes / 60.0;
        if self.direction.is_negative() {
            -value
        } else {
            value
        }
    }
}

impl fmt::Display for DmsCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:.5} {} {}",
            self.degrees, DEGREE_MARKER, self.minutes, MINUTE_MARKER, self.direction
        )
    }
}

fn dms_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // ([0-9]+)          - whole degrees, ASCII digits only
        // ([0-9]+\.[0-9]+)  - minutes, fractional part required
        // (СШ|ЮШ|ВД|ЗД)      - direction token, case-sensitive
        Regex::new(r"([0-9]+)\s+град\s+([0-9]+\.[0-9]+)\s+мин\s+(СШ|ЮШ|ВД|ЗД)")
            .expect("DMS pattern is valid")
    })
}

/// Parse the first DMS coordinate found anywhere in `text`.
///
/// Returns [`CovError::Format`] when no coordinate is present and
/// [`CovError::DmsNumber`] when one is present but its numbers overflow to
/// a non-finite value.
pub fn parse_dms_coordinate(text: &str) -> Result<DmsCoordinate, CovError> {
    let caps = dms_pattern()
        .captures(text)
        .ok_or_else(|| CovError::Format(text.to_string()))?;

    let degrees: f64 = caps[1]
        .parse()
        .map_err(|_| CovError::DmsNumber(text.to_string()))?;
    let minutes: f64 = caps[2]
        .parse()
        .map_err(|_| CovError::DmsNumber(text.to_string()))?;
    if !(degrees + minutes / 60.0).is_finite() {
        return Err(CovError::DmsNumber(text.to_string()));
    }
    let direction: Direction = caps[3].parse()?;

    Ok(DmsCoordinate {
        degrees,
        minutes,
        direction,
    })
}

/// Parse a DMS string into signed decimal degrees.
pub fn parse_dms(text: &str) -> Result<f64, CovError> {
    parse_dms_coordinate(text).map(|dms| dms.to_decimal())
}
