//! Persona-specific health guidance

use std::collections::HashMap;

use crate::error::CoreError;
use crate::persona::Persona;

use super::category::RiskCategory;

/// Static (category, persona) → guidance table.
#[derive(Debug, Clone)]
pub struct AdviceTable {
    entries: HashMap<(RiskCategory, Persona), &'static str>,
}

const TEMPLATES: [(RiskCategory, Persona, &str); 12] = [
    (
        RiskCategory::Low,
        Persona::ChildrenElderly,
        "Air quality is safe for outdoor activities. Children and elderly can enjoy normal \
        outdoor play and exercise.",
    ),
    (
        RiskCategory::Low,
        Persona::OutdoorWorkers,
        "Working conditions are safe. No special precautions needed for outdoor work.",
    ),
    (
        RiskCategory::Low,
        Persona::GeneralPublic,
        "Air quality is good. Enjoy your normal outdoor activities!",
    ),
    (
        RiskCategory::Moderate,
        Persona::ChildrenElderly,
        "Children and elderly may consider reducing prolonged outdoor exertion. Take breaks \
        during outdoor activities.",
    ),
    (
        RiskCategory::Moderate,
        Persona::OutdoorWorkers,
        "Monitor your health during long outdoor shifts. Consider more frequent breaks in shaded \
        areas.",
    ),
    (
        RiskCategory::Moderate,
        Persona::GeneralPublic,
        "Unusually sensitive people should consider reducing prolonged outdoor exertion.",
    ),
    (
        RiskCategory::High,
        Persona::ChildrenElderly,
        "Children and elderly should avoid prolonged outdoor exertion. Keep outdoor activities \
        short and take frequent breaks.",
    ),
    (
        RiskCategory::High,
        Persona::OutdoorWorkers,
        "Reduce prolonged outdoor work. Use protective masks if available and monitor for health \
        symptoms.",
    ),
    (
        RiskCategory::High,
        Persona::GeneralPublic,
        "Avoid prolonged outdoor exertion. Sensitive groups should stay indoors as much as \
        possible.",
    ),
    (
        RiskCategory::Hazardous,
        Persona::ChildrenElderly,
        "Children and elderly should remain indoors. Keep all outdoor activities to an absolute \
        minimum.",
    ),
    (
        RiskCategory::Hazardous,
        Persona::OutdoorWorkers,
        "Avoid outdoor work if possible. If unavoidable, use proper respiratory protection and \
        limit exposure time.",
    ),
    (
        RiskCategory::Hazardous,
        Persona::GeneralPublic,
        "Avoid all outdoor activities. Stay indoors and keep windows closed. Use air purifiers if \
        available.",
    ),
];

impl Default for AdviceTable {
    fn default() -> Self {
        Self::from_entries(TEMPLATES.iter().map(|&(c, p, text)| ((c, p), text)))
    }
}

impl AdviceTable {
    pub fn from_entries(
        entries: impl IntoIterator<Item = ((RiskCategory, Persona), &'static str)>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Guidance for a category and persona.
    pub fn advice(
        &self,
        category: RiskCategory,
        persona: Persona,
    ) -> Result<&'static str, CoreError> {
        self.entries
            .get(&(category, persona))
            .copied()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| CoreError::MissingAdviceTemplate {
                category: category.to_string(),
                persona: persona.to_string(),
            })
    }

    /// Check every combination has a non-empty entry.
    pub fn validate(&self) -> Result<(), CoreError> {
        for category in RiskCategory::ALL {
            for persona in Persona::ALL {
                self.advice(category, persona)?;
            }
        }
        Ok(())
    }
}

/// Guidance from the built-in table.
pub fn generate_health_advice(
    category: RiskCategory,
    persona: Persona,
) -> Result<&'static str, CoreError> {
    TEMPLATES
        .iter()
        .find(|(c, p, _)| *c == category && *p == persona)
        .map(|(_, _, text)| *text)
        .ok_or_else(|| CoreError::MissingAdviceTemplate {
            category: category.to_string(),
            persona: persona.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_table_is_total() {
        let table = AdviceTable::default();
        assert!(table.validate().is_ok());

        for category in RiskCategory::ALL {
            for persona in Persona::ALL {
                assert!(!generate_health_advice(category, persona).unwrap().is_empty());
            }
        }
    }

    #[test]
    fn test_lookup_is_keyed_by_both() {
        let table = AdviceTable::default();

        assert_eq!(
            table.advice(RiskCategory::Low, Persona::GeneralPublic).unwrap(),
            "Air quality is good. Enjoy your normal outdoor activities!"
        );
        assert!(
            table
                .advice(RiskCategory::Hazardous, Persona::OutdoorWorkers)
                .unwrap()
                .contains("respiratory protection")
        );
    }

    #[test]
    fn test_missing_entry_is_consistency_error() {
        let table = AdviceTable::from_entries([(
            (RiskCategory::Low, Persona::GeneralPublic),
            "Fine.",
        )]);

        let err = table
            .advice(RiskCategory::High, Persona::ChildrenElderly)
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingAdviceTemplate { .. }));
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_blank_entry_counts_as_missing() {
        let table =
            AdviceTable::from_entries([((RiskCategory::Low, Persona::GeneralPublic), "  ")]);
        assert!(table.advice(RiskCategory::Low, Persona::GeneralPublic).is_err());
    }
}
