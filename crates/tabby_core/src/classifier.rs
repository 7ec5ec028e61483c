//! Tab tier classification.
//!
//! # Responsibility
//! - Map `(url, title)` to a [`Tier`] with an ordered rule table.
//!
//! # Invariants
//! - Pure and total: no I/O, no hidden state, every input yields a tier.
//! - Groups are evaluated in declaration order; the first match wins.
//! - Matching is case-insensitive substring search on the URL only.

use crate::model::tab::Tier;

/// One tier and the URL fragments that select it.
#[derive(Debug, Clone, Copy)]
pub struct RuleGroup {
    pub tier: Tier,
    pub url_patterns: &'static [&'static str],
}

impl RuleGroup {
    fn matches(&self, lower_url: &str) -> bool {
        self.url_patterns
            .iter()
            .any(|pattern| lower_url.contains(pattern))
    }
}

/// Rule groups in priority order. Tabs matching none are `Tier::Other`.
pub const RULE_GROUPS: &[RuleGroup] = &[
    RuleGroup {
        tier: Tier::Focus,
        url_patterns: &[
            "github.com",
            "docs.",
            "localhost",
            "jira",
            "linear.app",
            "notion.so",
            "figma.com",
        ],
    },
    RuleGroup {
        tier: Tier::Research,
        url_patterns: &[
            "stackoverflow.com",
            "medium.com",
            "wikipedia.org",
            "news.ycombinator.com",
            "dev.to",
        ],
    },
    RuleGroup {
        tier: Tier::Chill,
        url_patterns: &[
            "youtube.com",
            "netflix.com",
            "reddit.com",
            "twitter.com",
            "x.com",
            "instagram.com",
            "discord.com",
        ],
    },
];

/// Classifies one tab with the built-in rule table.
///
/// `title` is part of the contract so title-based rules can be added without
/// touching callers; current rules ignore it.
pub fn classify(url: &str, title: &str) -> Tier {
    classify_with(RULE_GROUPS, url, title)
}

/// Classifies against an explicit rule table.
pub fn classify_with(groups: &[RuleGroup], url: &str, _title: &str) -> Tier {
    let lower_url = url.to_lowercase();
    groups
        .iter()
        .find(|group| group.matches(&lower_url))
        .map_or(Tier::Other, |group| group.tier)
}
