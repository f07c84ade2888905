use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate ratio between the Nether and the other two dimensions.
pub const NETHER_SCALE: f64 = 8.0;

/// One of the three logical sub-spaces of the tracked world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Nether,
    Overworld,
    End,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Nether, Dimension::Overworld, Dimension::End];

    /// Numeric id used by the upstream tracker.
    pub fn id(self) -> i8 {
        match self {
            Dimension::Nether => -1,
            Dimension::Overworld => 0,
            Dimension::End => 1,
        }
    }

    pub fn from_id(id: i8) -> Option<Self> {
        match id {
            -1 => Some(Dimension::Nether),
            0 => Some(Dimension::Overworld),
            1 => Some(Dimension::End),
            _ => None,
        }
    }

    pub fn pretty_name(self) -> &'static str {
        match self {
            Dimension::Nether => "Nether",
            Dimension::Overworld => "Overworld",
            Dimension::End => "End",
        }
    }

    /// Multiplier that brings this dimension's raw coordinates to overworld scale.
    pub fn scale(self) -> f64 {
        match self {
            Dimension::Nether => NETHER_SCALE,
            Dimension::Overworld | Dimension::End => 1.0,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pretty_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDimensionError(pub String);

impl fmt::Display for ParseDimensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dimension '{}'", self.0)
    }
}

impl std::error::Error for ParseDimensionError {}

impl FromStr for Dimension {
    type Err = ParseDimensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nether" => Ok(Dimension::Nether),
            "overworld" => Ok(Dimension::Overworld),
            "end" => Ok(Dimension::End),
            _ => Err(ParseDimensionError(s.to_string())),
        }
    }
}

/// Maps raw `(x, z)` in `dimension` to overworld-scale coordinates.
///
/// Apply exactly once to raw values: normalizing an already normalized
/// Nether coordinate scales it again.
pub fn normalize(dimension: Dimension, x: f64, z: f64) -> (f64, f64) {
    let scale = dimension.scale();
    (x * scale, z * scale)
}

/// Resolves the dimension of a point: its own, else its owner's, else Overworld.
pub fn resolve_dimension(own: Option<Dimension>, owner: Option<Dimension>) -> Dimension {
    own.or(owner).unwrap_or(Dimension::Overworld)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_nether_is_scaled_by_eight() {
        let (x, z) = normalize(Dimension::Nether, 12.5, -3.0);
        assert_approx_eq!(x, 100.0);
        assert_approx_eq!(z, -24.0);
    }

    #[test]
    fn test_overworld_and_end_are_identity() {
        assert_eq!(normalize(Dimension::Overworld, 12.5, -3.0), (12.5, -3.0));
        assert_eq!(normalize(Dimension::End, 12.5, -3.0), (12.5, -3.0));
    }

    #[test]
    fn test_normalize_is_not_idempotent_for_nether() {
        let once = normalize(Dimension::Nether, 1.0, 1.0);
        let twice = normalize(Dimension::Nether, once.0, once.1);
        assert_eq!(twice, (64.0, 64.0));
    }

    #[test]
    fn test_resolve_dimension_fallback_chain() {
        assert_eq!(
            resolve_dimension(Some(Dimension::End), Some(Dimension::Nether)),
            Dimension::End
        );
        assert_eq!(
            resolve_dimension(None, Some(Dimension::Nether)),
            Dimension::Nether
        );
        assert_eq!(resolve_dimension(None, None), Dimension::Overworld);
    }

    #[test]
    fn test_parse_by_name() {
        assert_eq!("NETHER".parse::<Dimension>(), Ok(Dimension::Nether));
        assert_eq!("overworld".parse::<Dimension>(), Ok(Dimension::Overworld));
        assert_eq!("End".parse::<Dimension>(), Ok(Dimension::End));
        assert!("moon".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_wire_ids_roundtrip() {
        for dimension in Dimension::ALL {
            assert_eq!(Dimension::from_id(dimension.id()), Some(dimension));
        }
        assert_eq!(Dimension::from_id(7), None);
    }
}
