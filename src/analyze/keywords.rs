// src/analyze/keywords.rs
//! Keyword scoring: a pure, stateless lookup over a tiered lexicon.
//!
//! Each tier carries a point weight; a keyword contributes its tier's points
//! once per article no matter how often it appears. Matching is whole-word
//! and case-insensitive over title + summary.

use once_cell::sync::Lazy;
use regex::Regex;

/// (points, keywords) tiers. The table favors biotech/FDA catalysts because
/// that is where headline wording moves small caps the hardest.
const TIERS: &[(i32, &[&str])] = &[
    (
        4,
        &[
            "Endpoints",
            "Endpoint",
            "Designation",
            "Breakthrough",
            "Pivotal",
            "Revolutionary",
        ],
    ),
    (
        3,
        &[
            "Phase III",
            "Positive",
            "Top-Line",
            "Significant",
            "Demonstrates",
            "Treatment",
            "Drug Trials",
            "Agreement",
            "Cancer",
            "Partnership",
            "Collaboration",
            "Improvements",
            "Successful",
            "Billionaire",
            "Carl Icahn",
            "Increase",
            "Awarded",
            "Primary",
            "Milestone",
            "Surge",
            "Record",
            "Approval Process",
            "Regulatory",
            "Clearance",
        ],
    ),
    (
        2,
        &[
            "Phase II",
            "Receives",
            "FDA",
            "Approval",
            "Benefits",
            "Benefit",
            "Beneficial",
            "Fast Track",
            "Breakout",
            "Acquires",
            "Acquire",
            "Acquisition",
            "Expand",
            "Expansion",
            "Contract",
            "Completes",
            "Promising",
            "Achieves",
            "Achieve",
            "Achievements",
            "Achievement",
            "Launches",
            "Enhancement",
            "Innovation",
            "Clinical Trial",
            "Pipeline",
            "Success",
            "Funding",
            "Grant",
        ],
    ),
    (
        1,
        &[
            "Phase I",
            "Grants",
            "Investors",
            "Accepted",
            "New",
            "Signs",
            "Merger",
            "Gain",
            "Initiates",
            "Starts",
            "Begins",
            "Preliminary",
            "Early Stage",
            "Development",
            "Prospects",
            "Proposal",
            "Investor Meeting",
        ],
    ),
];

static COMPILED: Lazy<Vec<(i32, Regex, &'static str)>> = Lazy::new(|| {
    let mut out = Vec::new();
    for (points, words) in TIERS {
        for word in *words {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
            let re = Regex::new(&pattern).expect("keyword regex");
            out.push((*points, re, *word));
        }
    }
    out
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordScore {
    pub score: i32,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score title + summary as one text.
    pub fn analyze(&self, title: &str, summary: &str) -> KeywordScore {
        let combined = format!("{title} {summary}");
        let mut score = 0;
        let mut keywords = Vec::new();
        for (points, re, word) in COMPILED.iter() {
            if re.is_match(&combined) {
                score += points;
                keywords.push((*word).to_string());
            }
        }
        keywords.sort();
        KeywordScore { score, keywords }
    }
}
