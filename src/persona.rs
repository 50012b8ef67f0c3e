//! Population personas used to modulate health-risk sensitivity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A demographic/activity profile.
///
/// The declaration order is the order of the one-hot block in the feature
/// vector and must not change without retraining the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    ChildrenElderly,
    OutdoorWorkers,
    GeneralPublic,
}

impl Persona {
    pub const ALL: [Persona; 3] = [
        Persona::ChildrenElderly,
        Persona::OutdoorWorkers,
        Persona::GeneralPublic,
    ];

    /// Machine identifier, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Persona::ChildrenElderly => "children_elderly",
            Persona::OutdoorWorkers => "outdoor_workers",
            Persona::GeneralPublic => "general_public",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Persona::ChildrenElderly => "Children / Elderly",
            Persona::OutdoorWorkers => "Outdoor Workers / Athletes",
            Persona::GeneralPublic => "General Public",
        }
    }

    /// Multiplier applied to pollutant exposure for this group.
    pub fn sensitivity(self) -> f64 {
        match self {
            Persona::ChildrenElderly => 1.5,
            Persona::OutdoorWorkers => 1.2,
            Persona::GeneralPublic => 1.0,
        }
    }

    pub fn baseline_risk(self) -> f64 {
        match self {
            Persona::ChildrenElderly => 0.3,
            Persona::OutdoorWorkers => 0.2,
            Persona::GeneralPublic => 0.1,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Persona::ChildrenElderly => 0,
            Persona::OutdoorWorkers => 1,
            Persona::GeneralPublic => 2,
        }
    }

    /// Three-way indicator block; exactly one entry is 1.0.
    pub fn one_hot(self) -> [f64; 3] {
        let mut encoded = [0.0; 3];
        encoded[self.index()] = 1.0;
        encoded
    }

    /// Convert a legacy four-way persona code.
    ///
    /// Codes 1 (child) and 2 (elderly) both collapse to `ChildrenElderly`.
    pub fn from_legacy_code(code: u8) -> Result<Self, CoreError> {
        match code {
            0 => Ok(Persona::GeneralPublic),
            1 | 2 => Ok(Persona::ChildrenElderly),
            3 => Ok(Persona::OutdoorWorkers),
            other => Err(CoreError::InvalidPersona(format!("legacy code {other}"))),
        }
    }
}

impl FromStr for Persona {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Persona::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| CoreError::InvalidPersona(s.to_string()))
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_personas() {
        for persona in Persona::ALL {
            assert_eq!(persona.as_str().parse::<Persona>().unwrap(), persona);
        }
    }

    #[test]
    fn test_parse_unknown_persona() {
        let err = "athletes".parse::<Persona>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidPersona(ref p) if p == "athletes"));
    }

    #[test]
    fn test_one_hot_has_single_indicator() {
        for persona in Persona::ALL {
            let encoded = persona.one_hot();
            assert_eq!(encoded.iter().sum::<f64>(), 1.0);
            assert_eq!(encoded[persona.index()], 1.0);
        }
    }

    #[test]
    fn test_legacy_codes() {
        assert_eq!(Persona::from_legacy_code(0).unwrap(), Persona::GeneralPublic);
        assert_eq!(Persona::from_legacy_code(1).unwrap(), Persona::ChildrenElderly);
        assert_eq!(Persona::from_legacy_code(2).unwrap(), Persona::ChildrenElderly);
        assert_eq!(Persona::from_legacy_code(3).unwrap(), Persona::OutdoorWorkers);
        assert!(Persona::from_legacy_code(4).is_err());
    }

    #[test]
    fn test_sensitivity_ordering() {
        assert!(Persona::ChildrenElderly.sensitivity() > Persona::OutdoorWorkers.sensitivity());
        assert!(Persona::OutdoorWorkers.sensitivity() > Persona::GeneralPublic.sensitivity());
    }
}
