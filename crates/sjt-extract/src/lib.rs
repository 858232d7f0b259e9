//! Layered heuristic extraction of achievement names from profile page HTML.
//!
//! The page format changes often and is not under our control, so extraction
//! runs an ordered list of strategies. The structured block scan is
//! authoritative: any result from it is returned as-is. Only when it finds
//! nothing do the remaining strategies run, accumulating into one result.
//! Every strategy feeds candidates through the same normalize, filter,
//! classify, tag, dedup pipeline, so the output lists never contain
//! duplicates and every name carries its category marker.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sjt_core::{
    normalize_title, AchievementCategory, AchievementName, ARCADE_GAME_TAG, SKILL_BADGE_TAG,
};

pub const CRATE_NAME: &str = "sjt-extract";

/// Empty-state phrases that disqualify a candidate outright.
const NEGATIVE_PHRASES: [&str; 4] = [
    "hasn't earned",
    "has not earned",
    "no badges",
    "no skill badges",
];

/// Class-name fragments that mark achievement list containers.
const CONTAINER_CLASS_PATTERNS: [&str; 6] = [
    "badg",
    "skill-badg",
    "badge-list",
    "badges-list",
    "public-profile__badges",
    "profile-badges",
];

/// Classified, deduplicated achievement lists in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub badges: Vec<AchievementName>,
    pub arcade_games: Vec<AchievementName>,
}

struct Strategy {
    authoritative: bool,
    run: fn(&StrategyInput, &mut ListBuilder),
}

const STRATEGIES: [Strategy; 4] = [
    Strategy {
        authoritative: true,
        run: scan_profile_badge_blocks,
    },
    Strategy {
        authoritative: false,
        run: scan_badge_containers,
    },
    Strategy {
        authoritative: false,
        run: scan_page_links,
    },
    Strategy {
        authoritative: false,
        run: scan_literal_tags,
    },
];

struct StrategyInput<'a> {
    document: Html,
    raw: &'a str,
}

/// Extract achievement names from arbitrary profile HTML.
///
/// Deterministic and infallible: parse or selector trouble degrades to an
/// empty contribution from the affected strategy.
pub fn extract(html: &str) -> Extraction {
    let input = StrategyInput {
        document: Html::parse_document(html),
        raw: html,
    };

    let mut merged = ListBuilder::default();
    for strategy in &STRATEGIES {
        if strategy.authoritative {
            let mut own = ListBuilder::default();
            (strategy.run)(&input, &mut own);
            if !own.is_empty() {
                return own.finish();
            }
        } else {
            (strategy.run)(&input, &mut merged);
        }
    }
    merged.finish()
}

/// Accumulates candidates per category with first-occurrence dedup on the
/// final tagged text.
#[derive(Default)]
struct ListBuilder {
    badges: Vec<AchievementName>,
    arcade_games: Vec<AchievementName>,
    seen_badges: HashSet<String>,
    seen_arcade: HashSet<String>,
}

impl ListBuilder {
    /// Admit a raw candidate title: normalize, drop empty-state text,
    /// classify by the "Level N" rule, tag, dedup-insert.
    fn add_title(&mut self, raw: &str) {
        let normalized = normalize_title(raw);
        if normalized.is_empty() || contains_negative_phrase(&normalized) {
            return;
        }
        let category = AchievementCategory::classify(&normalized);
        self.insert(AchievementName::tagged(&normalized, category));
    }

    /// Admit a candidate whose category is fixed by the strategy that found
    /// it, regardless of what the title text says.
    fn add_tagged(&mut self, raw: &str, category: AchievementCategory) {
        let normalized = normalize_title(raw);
        if normalized.is_empty() || contains_negative_phrase(&normalized) {
            return;
        }
        self.insert(AchievementName::tagged(&normalized, category));
    }

    fn insert(&mut self, name: AchievementName) {
        let (list, seen) = match name.category() {
            AchievementCategory::SkillBadge => (&mut self.badges, &mut self.seen_badges),
            AchievementCategory::ArcadeGame => (&mut self.arcade_games, &mut self.seen_arcade),
        };
        if seen.insert(name.as_str().to_string()) {
            list.push(name);
        }
    }

    fn is_empty(&self) -> bool {
        self.badges.is_empty() && self.arcade_games.is_empty()
    }

    fn finish(self) -> Extraction {
        Extraction {
            badges: self.badges,
            arcade_games: self.arcade_games,
        }
    }
}

fn contains_negative_phrase(text: &str) -> bool {
    let lowered = text.to_lowercase();
    NEGATIVE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn text_of(el: &ElementRef) -> Option<String> {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    let normalized = normalize_title(&joined);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Dedicated achievement blocks as rendered by the profile page itself.
/// Each block holds a title element and usually an earned-date element,
/// which is ignored.
fn scan_profile_badge_blocks(input: &StrategyInput, out: &mut ListBuilder) {
    let Ok(block_sel) = Selector::parse(".profile-badges .profile-badge") else {
        return;
    };
    for block in input.document.select(&block_sel) {
        if let Some(title) = block_title(&block) {
            out.add_title(&title);
        }
    }
}

fn block_title(block: &ElementRef) -> Option<String> {
    if let Ok(title_sel) = Selector::parse(r#"span[class*="ql-title"]"#) {
        if let Some(el) = block.select(&title_sel).next() {
            return text_of(&el);
        }
    }
    // No dedicated title span; take the first text-bearing element instead.
    if let Ok(any_sel) = Selector::parse("span, div") {
        for el in block.select(&any_sel) {
            if let Some(text) = text_of(&el) {
                return Some(text);
            }
        }
    }
    None
}

/// Elements whose class attribute looks like an achievement container; their
/// text-bearing descendants are candidates when the text or link target
/// signals an achievement.
fn scan_badge_containers(input: &StrategyInput, out: &mut ListBuilder) {
    let Ok(classed_sel) = Selector::parse("[class]") else {
        return;
    };
    let Ok(descendant_sel) = Selector::parse("a, li, div, span") else {
        return;
    };
    for container in input.document.select(&classed_sel) {
        if !has_container_class(&container) {
            continue;
        }
        for el in container.select(&descendant_sel) {
            let Some(text) = text_of(&el) else {
                continue;
            };
            let href = if el.value().name() == "a" {
                el.value().attr("href").unwrap_or("")
            } else {
                ""
            };
            if accepts_container_candidate(&text, href) {
                out.add_title(&text);
            }
        }
    }
}

fn has_container_class(el: &ElementRef) -> bool {
    el.value().classes().any(|class| {
        let lowered = class.to_ascii_lowercase();
        CONTAINER_CLASS_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
    })
}

fn accepts_container_candidate(text: &str, href: &str) -> bool {
    text.contains(SKILL_BADGE_TAG)
        || text.contains(ARCADE_GAME_TAG)
        || text.to_lowercase().contains("skill badge")
        || href.contains("/badges")
        || href.contains("/quests")
        || href.contains("/skill")
}

/// Every hyperlink on the page whose target looks achievement-shaped.
fn scan_page_links(input: &StrategyInput, out: &mut ListBuilder) {
    let Ok(anchor_sel) = Selector::parse("a[href]") else {
        return;
    };
    for anchor in input.document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(text) = text_of(&anchor) else {
            continue;
        };
        if href.contains("/badges") || href.to_lowercase().contains("badge") || href.contains("/quests")
        {
            out.add_title(&text);
        }
    }
}

/// Raw-text rescue: substrings that literally end in a category tag. The
/// matching pattern fixes the category, not the title text.
fn scan_literal_tags(input: &StrategyInput, out: &mut ListBuilder) {
    const TAG_PATTERNS: [(&str, AchievementCategory); 2] = [
        (
            r"([A-Za-z0-9\-:,() '&]+\[Skill Badge\])",
            AchievementCategory::SkillBadge,
        ),
        (r"([A-Za-z0-9\-:,() '&]+\[Game\])", AchievementCategory::ArcadeGame),
    ];

    for (pattern, category) in TAG_PATTERNS {
        if let Ok(re) = Regex::new(pattern) {
            for capture in re.captures_iter(input.raw) {
                if let Some(matched) = capture.get(1) {
                    out.add_tagged(matched.as_str(), category);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge_texts(extraction: &Extraction) -> Vec<&str> {
        extraction.badges.iter().map(|n| n.as_str()).collect()
    }

    fn arcade_texts(extraction: &Extraction) -> Vec<&str> {
        extraction.arcade_games.iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn block_scan_classifies_and_tags_titles() {
        let html = r#"
            <html><body>
              <div class="profile-badges">
                <div class="profile-badge">
                  <span class="ql-title-medium">Develop Gen AI Apps with Gemini and Streamlit</span>
                  <span class="ql-body-medium l-mbs">Earned Aug 2, 2026</span>
                </div>
                <div class="profile-badge">
                  <span class="ql-title-medium">Level 3: Generative AI Leader</span>
                  <span class="ql-body-medium">Earned Aug 9, 2026</span>
                </div>
              </div>
            </body></html>
        "#;
        let extraction = extract(html);
        assert_eq!(
            badge_texts(&extraction),
            vec!["Develop Gen AI Apps with Gemini and Streamlit [Skill Badge]"]
        );
        assert_eq!(
            arcade_texts(&extraction),
            vec!["Level 3: Generative AI Leader [Game]"]
        );
    }

    #[test]
    fn block_title_falls_back_to_first_text_element() {
        let html = r#"
            <div class="profile-badges">
              <div class="profile-badge">
                <img src="badge.png">
                <span>Build Infrastructure   with Terraform</span>
              </div>
            </div>
        "#;
        let extraction = extract(html);
        assert_eq!(
            badge_texts(&extraction),
            vec!["Build Infrastructure with Terraform [Skill Badge]"]
        );
    }

    #[test]
    fn authoritative_blocks_suppress_fallback_matches() {
        let html = r#"
            <div class="profile-badges">
              <div class="profile-badge">
                <span class="ql-title-medium">Set Up an App Dev Environment</span>
              </div>
            </div>
            <ul class="badge-list">
              <li><a href="/badges/999">Confounding Fallback Entry</a></li>
            </ul>
            <a href="https://example.com/badges/123">Another Confounder</a>
            Stray text: Orphan Title [Skill Badge]
        "#;
        let extraction = extract(html);
        assert_eq!(
            badge_texts(&extraction),
            vec!["Set Up an App Dev Environment [Skill Badge]"]
        );
        assert!(extraction.arcade_games.is_empty());
    }

    #[test]
    fn filtered_blocks_do_not_suppress_fallbacks() {
        // Blocks that only carry empty-state text yield nothing, so the
        // cumulative strategies still run.
        let html = r#"
            <div class="profile-badges">
              <div class="profile-badge">
                <span class="ql-title-medium">User hasn't earned any badges yet</span>
              </div>
            </div>
            <p>Completed: Deploy Kubernetes Applications [Skill Badge]</p>
        "#;
        let extraction = extract(html);
        assert_eq!(
            badge_texts(&extraction),
            vec!["Completed: Deploy Kubernetes Applications [Skill Badge]"]
        );
    }

    #[test]
    fn negative_phrases_discard_candidates() {
        let html = r#"
            <div class="badges-list">
              <a href="/badges">User hasn't earned any badges yet</a>
              <span>No skill badges to show</span>
            </div>
            <a href="/quests/empty">This user has not earned anything</a>
        "#;
        let extraction = extract(html);
        assert!(extraction.badges.is_empty());
        assert!(extraction.arcade_games.is_empty());
    }

    #[test]
    fn container_scan_accepts_text_and_link_signals() {
        let html = r#"
            <div class="public-profile__badges">
              <li>Analyze Images with the Vision API [Skill Badge]</li>
              <a href="/quests/144">Cloud Hero Challenge</a>
              <span>unrelated caption</span>
            </div>
        "#;
        let extraction = extract(html);
        assert_eq!(
            badge_texts(&extraction),
            vec![
                "Analyze Images with the Vision API [Skill Badge]",
                "Cloud Hero Challenge [Skill Badge]",
            ]
        );
    }

    #[test]
    fn page_link_scan_tags_untagged_titles() {
        let html = r#"
            <main>
              <a href="https://www.cloudskillsboost.google/badges/77">Prepare Data for ML APIs</a>
              <a href="/quests/901">Level 1: Arcade Base Camp</a>
              <a href="/unrelated/1">Ignore Me</a>
            </main>
        "#;
        let extraction = extract(html);
        assert_eq!(badge_texts(&extraction), vec!["Prepare Data for ML APIs [Skill Badge]"]);
        assert_eq!(arcade_texts(&extraction), vec!["Level 1: Arcade Base Camp [Game]"]);
    }

    #[test]
    fn duplicate_candidates_keep_first_occurrence() {
        let html = r#"
            <div class="badge-list">
              <a href="/badges/1">Implement Load Balancing</a>
              <li>Implement   Load Balancing [Skill Badge]</li>
            </div>
            <a href="/badges/1">Implement Load Balancing</a>
        "#;
        let extraction = extract(html);
        assert_eq!(
            badge_texts(&extraction),
            vec!["Implement Load Balancing [Skill Badge]"]
        );
    }

    #[test]
    fn literal_tag_category_overrides_title_text() {
        // The pattern that matched decides the list, even when the title
        // carries a "Level N" marker.
        let html = "<ul><li>Level 2 Retrospective [Skill Badge]</li><li>Trivia Night [Game]</li></ul>";
        let extraction = extract(html);
        assert_eq!(badge_texts(&extraction), vec!["Level 2 Retrospective [Skill Badge]"]);
        assert_eq!(arcade_texts(&extraction), vec!["Trivia Night [Game]"]);
    }

    #[test]
    fn broken_markup_degrades_to_empty() {
        let extraction = extract("<<<<<>>>> <div class=>");
        assert!(extraction.badges.is_empty());
        assert!(extraction.arcade_games.is_empty());
    }
}
