// src/utils/tags.rs

//! Shared text tagging for fetcher plugins and the aggregator.
//!
//! Every source used to carry its own copy of skill extraction and seniority
//! matching. They live here so the orchestration core stays free of
//! site-specific string matching.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::models::RawPosting;

/// Skill vocabulary: (tag, pattern). Patterns are matched case-insensitively
/// on word boundaries.
const SKILLS: &[(&str, &str)] = &[
    ("python", r"python"),
    ("rust", r"rust"),
    ("go", r"golang|go(?:\s+developer|\s+engineer)"),
    ("java", r"java(?:\s|,|/|$)"),
    ("javascript", r"javascript|js"),
    ("typescript", r"typescript|ts"),
    ("c++", r"c\+\+|cpp"),
    ("c#", r"c#|\.net|dotnet"),
    ("ruby", r"ruby|rails"),
    ("php", r"php|laravel"),
    ("kotlin", r"kotlin"),
    ("swift", r"swift"),
    ("sql", r"sql|postgres(?:ql)?|mysql"),
    ("react", r"react(?:\.js|js)?"),
    ("vue", r"vue(?:\.js|js)?"),
    ("angular", r"angular"),
    ("node", r"node(?:\.js|js)?"),
    ("django", r"django"),
    ("flask", r"flask"),
    ("fastapi", r"fastapi"),
    ("aws", r"aws|amazon web services"),
    ("gcp", r"gcp|google cloud"),
    ("azure", r"azure"),
    ("docker", r"docker"),
    ("kubernetes", r"kubernetes|k8s"),
    ("terraform", r"terraform"),
    ("linux", r"linux"),
    ("machine-learning", r"machine learning|ml engineer|pytorch|tensorflow"),
    ("data", r"data engineer(?:ing)?|data scien(?:ce|tist)|spark|airflow"),
];

struct CompiledSkill {
    tag: &'static str,
    re: Regex,
}

fn skill_patterns() -> &'static [CompiledSkill] {
    static SKILL_RES: OnceLock<Vec<CompiledSkill>> = OnceLock::new();
    SKILL_RES.get_or_init(|| {
        SKILLS
            .iter()
            .filter_map(|&(tag, pattern)| {
                let full = format!(r"(?i)(?:^|[^\w+#.])(?:{pattern})(?:$|[^\w+#])");
                match Regex::new(&full) {
                    Ok(re) => Some(CompiledSkill { tag, re }),
                    Err(e) => {
                        log::error!("Skipping skill pattern '{tag}': {e}");
                        None
                    }
                }
            })
            .collect()
    })
}

/// Extract skill tags from free text, in vocabulary order, without duplicates.
pub fn extract_tags(text: &str) -> Vec<String> {
    skill_patterns()
        .iter()
        .filter(|skill| skill.re.is_match(text))
        .map(|skill| skill.tag.to_string())
        .collect()
}

/// Seniority bucket inferred from posting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Internship,
    Entry,
    Mid,
    Senior,
    Lead,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 5] = [
        ExperienceLevel::Internship,
        ExperienceLevel::Entry,
        ExperienceLevel::Mid,
        ExperienceLevel::Senior,
        ExperienceLevel::Lead,
    ];

    /// Keywords that mark a posting as belonging to this level.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            ExperienceLevel::Internship => &["intern", "internship", "trainee", "apprentice"],
            ExperienceLevel::Entry => &["entry", "junior", "jr", "graduate", "new grad"],
            ExperienceLevel::Mid => &["mid", "mid-level", "intermediate", "regular"],
            ExperienceLevel::Senior => &["senior", "sr", "experienced"],
            ExperienceLevel::Lead => &["lead", "principal", "staff", "head of", "architect"],
        }
    }

    fn regex(self) -> &'static Regex {
        static LEVEL_RES: OnceLock<Vec<Regex>> = OnceLock::new();
        let all = LEVEL_RES.get_or_init(|| {
            Self::ALL
                .iter()
                .map(|level| {
                    let alternatives: Vec<String> =
                        level.keywords().iter().map(|k| regex::escape(k)).collect();
                    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
                    Regex::new(&pattern).expect("escaped keywords form a valid regex")
                })
                .collect()
        });
        &all[self as usize]
    }

    /// Whether the text mentions one of this level's keywords.
    pub fn matches(self, text: &str) -> bool {
        self.regex().is_match(text)
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExperienceLevel::Internship => "internship",
            ExperienceLevel::Entry => "entry",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Lead => "lead",
        };
        f.write_str(s)
    }
}

impl FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.to_string() == wanted || level.keywords().contains(&wanted.as_str()))
            .ok_or_else(|| format!("unknown experience level '{s}'"))
    }
}

/// Whether a posting satisfies an experience-level filter.
///
/// Known levels match any of their keywords in title or description; any
/// other filter string is matched literally (case-insensitive).
pub fn matches_experience(posting: &RawPosting, filter: &str) -> bool {
    let filter = filter.trim();
    if filter.is_empty() {
        return true;
    }
    match filter.parse::<ExperienceLevel>() {
        Ok(level) => level.matches(&posting.title) || level.matches(&posting.description),
        Err(_) => {
            let needle = filter.to_lowercase();
            posting.title.to_lowercase().contains(&needle)
                || posting.description.to_lowercase().contains(&needle)
        }
    }
}

/// Truncate to at most `max` grapheme clusters, appending an ellipsis when cut.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
