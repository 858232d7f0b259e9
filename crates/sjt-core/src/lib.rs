//! Core domain model for the Study Jams progress tracker.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

pub const CRATE_NAME: &str = "sjt-core";

/// Suffix marker appended to skill badge names.
pub const SKILL_BADGE_TAG: &str = "[Skill Badge]";
/// Suffix marker appended to arcade game names.
pub const ARCADE_GAME_TAG: &str = "[Game]";
/// Separator used when joining achievement names into a stored list field.
pub const NAME_LIST_SEPARATOR: &str = " | ";

/// Completion thresholds: a learner is done once both are met.
pub const SKILL_BADGE_TARGET: u32 = 19;
pub const ARCADE_GAME_TARGET: u32 = 1;

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn normalize_title(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True once the stored counts satisfy the completion rule.
pub fn completion_met(skill_badges: u32, arcade_games: u32) -> bool {
    skill_badges >= SKILL_BADGE_TARGET && arcade_games >= ARCADE_GAME_TARGET
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AchievementCategory {
    SkillBadge,
    ArcadeGame,
}

impl AchievementCategory {
    /// Classify a title by its text alone. Only an explicit "Level <number>"
    /// marker makes an arcade game; topical keywords do not.
    pub fn classify(title: &str) -> Self {
        if let Ok(re) = Regex::new(r"(?i)\blevel\s*\d+\b") {
            if re.is_match(title) {
                return Self::ArcadeGame;
            }
        }
        Self::SkillBadge
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::SkillBadge => SKILL_BADGE_TAG,
            Self::ArcadeGame => ARCADE_GAME_TAG,
        }
    }
}

/// A normalized achievement title carrying its category suffix marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AchievementName {
    text: String,
    category: AchievementCategory,
}

impl AchievementName {
    /// Build the final tagged form. The tag is appended unless the text
    /// already contains it.
    pub fn tagged(normalized_title: &str, category: AchievementCategory) -> Self {
        let tag = category.tag();
        let text = if normalized_title.contains(tag) {
            normalized_title.to_string()
        } else {
            format!("{normalized_title} {tag}")
        };
        Self { text, category }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> AchievementCategory {
        self.category
    }
}

/// Result of one fetch attempt against a profile page.
///
/// Invariant: when `error` is set both lists are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub source_url: String,
    pub badges: Vec<AchievementName>,
    pub arcade_games: Vec<AchievementName>,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn success(
        source_url: impl Into<String>,
        badges: Vec<AchievementName>,
        arcade_games: Vec<AchievementName>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            badges,
            arcade_games,
            error: None,
        }
    }

    pub fn failure(source_url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            badges: Vec::new(),
            arcade_games: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// A failed attempt produced an error and no evidence at all.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() && self.badges.is_empty() && self.arcade_games.is_empty()
    }
}

/// One learner row from the persisted roster.
///
/// Field names mirror the roster file exactly. Counts tolerate the numeric
/// strings older exports contain. Keys that are absent in the input stay
/// absent on write; unrecognized keys round-trip through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "User Name", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(
        rename = "Google Cloud Skills Boost Profile URL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub skills_boost_url: Option<String>,
    #[serde(rename = "Profile URL", default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(
        rename = "# of Skill Badges Completed",
        default,
        deserialize_with = "flexible_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub skill_badge_count: Option<u32>,
    #[serde(
        rename = "Names of Completed Skill Badges",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub skill_badge_names: Option<String>,
    #[serde(
        rename = "# of Arcade Games Completed",
        default,
        deserialize_with = "flexible_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub arcade_game_count: Option<u32>,
    #[serde(
        rename = "Names of Completed Arcade Games",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub arcade_game_names: Option<String>,
    #[serde(
        rename = "# of Courses Completed",
        default,
        deserialize_with = "flexible_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_course_count: Option<u32>,
    #[serde(
        rename = "All Skill Badges & Games Completed",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub all_completed_flag: Option<String>,
    #[serde(
        rename = "All 3 Pathways Completed - Yes or No",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pathways_completed_flag: Option<String>,
    #[serde(
        rename = "Gen AI Arcade Game Completion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub arcade_short_flag: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl ProfileRecord {
    /// The URL this record is fetched and matched by: the primary key if it
    /// holds a non-empty string, otherwise the alternate key.
    pub fn url(&self) -> Option<&str> {
        for candidate in [self.skills_boost_url.as_deref(), self.profile_url.as_deref()] {
            if let Some(url) = candidate {
                if !url.is_empty() {
                    return Some(url);
                }
            }
        }
        None
    }
}

/// Counts arrive as JSON numbers, numeric strings, or empty strings. An
/// empty string reads as zero; anything unparseable is a load error.
fn flexible_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCount {
        Number(u32),
        Text(String),
    }

    match Option::<RawCount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawCount::Number(n)) => Ok(Some(n)),
        Some(RawCount::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(Some(0))
            } else {
                trimmed
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| serde::de::Error::custom(format!("invalid count value {text:?}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_marker_classifies_as_arcade_game() {
        assert_eq!(
            AchievementCategory::classify("Level 3: Generative AI Leader"),
            AchievementCategory::ArcadeGame
        );
        assert_eq!(
            AchievementCategory::classify("level 1 - The Arcade Base Camp"),
            AchievementCategory::ArcadeGame
        );
        assert_eq!(
            AchievementCategory::classify("LEVEL  2: Networking Nomad"),
            AchievementCategory::ArcadeGame
        );
    }

    #[test]
    fn topical_keywords_alone_stay_skill_badges() {
        assert_eq!(
            AchievementCategory::classify("Develop Gen AI Apps with Gemini and Streamlit"),
            AchievementCategory::SkillBadge
        );
        assert_eq!(
            AchievementCategory::classify("Leveling Up Your Cloud Skills"),
            AchievementCategory::SkillBadge
        );
        assert_eq!(
            AchievementCategory::classify("The Arcade Level"),
            AchievementCategory::SkillBadge
        );
    }

    #[test]
    fn tagged_appends_marker_once() {
        let badge = AchievementName::tagged("Cloud Functions: 3 Ways", AchievementCategory::SkillBadge);
        assert_eq!(badge.as_str(), "Cloud Functions: 3 Ways [Skill Badge]");

        let already = AchievementName::tagged(
            "Cloud Functions: 3 Ways [Skill Badge]",
            AchievementCategory::SkillBadge,
        );
        assert_eq!(already.as_str(), "Cloud Functions: 3 Ways [Skill Badge]");

        let game = AchievementName::tagged("Level 2: Cloud Quest", AchievementCategory::ArcadeGame);
        assert_eq!(game.as_str(), "Level 2: Cloud Quest [Game]");
        assert_eq!(game.category(), AchievementCategory::ArcadeGame);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_title("  Build   Infrastructure\n\twith Terraform  "),
            "Build Infrastructure with Terraform"
        );
    }

    #[test]
    fn completion_rule_requires_both_thresholds() {
        assert!(completion_met(19, 1));
        assert!(completion_met(25, 3));
        assert!(!completion_met(18, 5));
        assert!(!completion_met(19, 0));
    }

    #[test]
    fn failure_outcome_has_no_evidence() {
        let outcome = FetchOutcome::failure("https://example.com/p/1", "connection refused");
        assert!(outcome.is_failure());
        assert!(outcome.badges.is_empty());
        assert!(outcome.arcade_games.is_empty());

        let ok = FetchOutcome::success("https://example.com/p/1", Vec::new(), Vec::new());
        assert!(!ok.is_failure());
    }

    #[test]
    fn record_url_skips_empty_primary_key() {
        let record: ProfileRecord = serde_json::from_value(serde_json::json!({
            "Google Cloud Skills Boost Profile URL": "",
            "Profile URL": "https://www.cloudskillsboost.google/public_profiles/abc"
        }))
        .unwrap();
        assert_eq!(
            record.url(),
            Some("https://www.cloudskillsboost.google/public_profiles/abc")
        );

        let none: ProfileRecord = serde_json::from_value(serde_json::json!({
            "User Name": "Asha"
        }))
        .unwrap();
        assert_eq!(none.url(), None);
    }

    #[test]
    fn counts_accept_numbers_and_numeric_strings() {
        let record: ProfileRecord = serde_json::from_value(serde_json::json!({
            "# of Skill Badges Completed": "17",
            "# of Arcade Games Completed": 2,
            "# of Courses Completed": ""
        }))
        .unwrap();
        assert_eq!(record.skill_badge_count, Some(17));
        assert_eq!(record.arcade_game_count, Some(2));
        assert_eq!(record.total_course_count, Some(0));
    }

    #[test]
    fn malformed_count_is_an_error() {
        let result: Result<ProfileRecord, _> = serde_json::from_value(serde_json::json!({
            "# of Skill Badges Completed": "many"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_keys_round_trip_and_absent_keys_stay_absent() {
        let input = serde_json::json!({
            "User Name": "Diya Sharma",
            "Google Cloud Skills Boost Profile URL": "https://example.com/p/2",
            "# of Skill Badges Completed": "3",
            "College Name": "Bennett University"
        });
        let record: ProfileRecord = serde_json::from_value(input).unwrap();
        let output = serde_json::to_value(&record).unwrap();

        assert_eq!(output["College Name"], "Bennett University");
        // The string count serializes back as a number.
        assert_eq!(output["# of Skill Badges Completed"], 3);
        let keys: Vec<&String> = output.as_object().unwrap().keys().collect();
        assert!(!keys.iter().any(|k| k.as_str() == "Profile URL"));
        assert!(!keys.iter().any(|k| k.as_str() == "All 3 Pathways Completed - Yes or No"));
    }
}
