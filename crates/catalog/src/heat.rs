use crate::tags::value_key;
use serde::{Deserialize, Serialize};

/// Fixed ordinal spice scale used for threshold comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLevel {
    NoHeat,
    Mild,
    Medium,
    Hot,
    ExtraHot,
}

impl HeatLevel {
    pub const ALL: [HeatLevel; 5] = [
        HeatLevel::NoHeat,
        HeatLevel::Mild,
        HeatLevel::Medium,
        HeatLevel::Hot,
        HeatLevel::ExtraHot,
    ];

    pub const fn rank(self) -> u8 {
        match self {
            HeatLevel::NoHeat => 0,
            HeatLevel::Mild => 1,
            HeatLevel::Medium => 2,
            HeatLevel::Hot => 3,
            HeatLevel::ExtraHot => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            HeatLevel::NoHeat => "No Heat",
            HeatLevel::Mild => "Mild",
            HeatLevel::Medium => "Medium",
            HeatLevel::Hot => "Hot",
            HeatLevel::ExtraHot => "Extra Hot",
        }
    }

    /// Maps a HeatSpice tag value onto the scale; values off the scale return `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = value_key(raw);
        let level = match key.as_str() {
            "no_heat" | "none" | "no_spice" | "not_spicy" | "non_spicy" | "not_hot"
            | "zero_heat" => HeatLevel::NoHeat,
            "mild" | "mild_only" | "mild_heat" | "low" | "low_heat" => HeatLevel::Mild,
            "medium" | "medium_heat" | "moderate" | "medium_only" => HeatLevel::Medium,
            "hot" | "spicy" | "hot_only" | "hot_heat" => HeatLevel::Hot,
            "extra_hot" | "extrahot" | "very_hot" | "extra_spicy" | "very_spicy" => {
                HeatLevel::ExtraHot
            }
            _ => return None,
        };
        Some(level)
    }

    /// Highest recognised level among `values`.
    pub fn highest<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        values.into_iter().filter_map(Self::parse).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_ordered() {
        for pair in HeatLevel::ALL.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!(HeatLevel::parse("Mild only"), Some(HeatLevel::Mild));
        assert_eq!(HeatLevel::parse("mild-only"), Some(HeatLevel::Mild));
        assert_eq!(HeatLevel::parse("No Heat"), Some(HeatLevel::NoHeat));
        assert_eq!(HeatLevel::parse("Extra Hot"), Some(HeatLevel::ExtraHot));
        assert_eq!(HeatLevel::parse("Very Spicy"), Some(HeatLevel::ExtraHot));
        assert_eq!(HeatLevel::parse("HOT"), Some(HeatLevel::Hot));
        assert_eq!(HeatLevel::parse("Smoky"), None);
    }

    #[test]
    fn off_scale_values_are_not_guessed() {
        assert_eq!(HeatLevel::parse("Not hot"), Some(HeatLevel::NoHeat));
        assert_eq!(HeatLevel::parse("No dairy"), None);
        assert_eq!(HeatLevel::parse("Hot honey glaze"), None);
        assert_eq!(HeatLevel::parse("Mildly smoky"), None);
    }

    #[test]
    fn highest_ignores_unrecognised_values() {
        let values = ["Smoky", "Mild", "Medium"];
        assert_eq!(HeatLevel::highest(values), Some(HeatLevel::Medium));
        assert_eq!(HeatLevel::highest(["Smoky"]), None);
    }
}
