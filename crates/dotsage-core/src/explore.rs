// Filtering, searching and ranking of a fetched question list.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::question::{Category, Question, UnknownCategory};

/// Milliseconds in one day, the unit of question age for trending.
pub const MS_PER_DAY: f64 = 86_400_000.0;

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Sort orders offered by the explore view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Trending,
    Newest,
    Oldest,
    MostVotes,
    HighestScore,
}

/// Returned when a string is not one of the sort key names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort key `{0}`")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trending" => Ok(SortKey::Trending),
            "newest" => Ok(SortKey::Newest),
            "oldest" => Ok(SortKey::Oldest),
            "most_votes" => Ok(SortKey::MostVotes),
            "highest_score" => Ok(SortKey::HighestScore),
            other => Err(UnknownSortKey(other.to_string())),
        }
    }
}

/// Category filter: everything, or a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => *c == category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "All" {
            Ok(CategoryFilter::All)
        } else {
            s.parse().map(CategoryFilter::Only)
        }
    }
}

/// A complete explore request.
#[derive(Debug, Clone, Default)]
pub struct ExploreQuery {
    pub category: CategoryFilter,
    pub search: Option<String>,
    pub sort: SortKey,
}

/// The explore view handed back to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExploreResult {
    pub questions: Vec<Question>,
    /// Questions considered before filtering.
    pub total: usize,
    /// Questions left after filtering.
    pub shown: usize,
    /// Whether `questions` are canned examples rather than ledger records.
    pub examples: bool,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Trending rank: `score * (1 + 1 / (1 + age_in_days))`.
///
/// Timestamps in the future count as age zero.
pub fn trending_score(question: &Question, now_ms: u64) -> f64 {
    let age_days = now_ms.saturating_sub(question.created_at) as f64 / MS_PER_DAY;
    question.score() as f64 * (1.0 + 1.0 / (1.0 + age_days))
}

fn compare(a: &Question, b: &Question, sort: SortKey, now_ms: u64) -> Ordering {
    match sort {
        SortKey::Trending => trending_score(b, now_ms).total_cmp(&trending_score(a, now_ms)),
        SortKey::Newest => b.created_at.cmp(&a.created_at),
        SortKey::Oldest => a.created_at.cmp(&b.created_at),
        SortKey::MostVotes => b.total_votes().cmp(&a.total_votes()),
        SortKey::HighestScore => b.score().cmp(&a.score()),
    }
}

// ---------------------------------------------------------------------------
// Explore
// ---------------------------------------------------------------------------

/// Filter by category and case-insensitive text search, then sort. The sort
/// is stable, so ties keep their input order.
pub fn filter_and_sort(questions: &[Question], query: &ExploreQuery, now_ms: u64) -> Vec<Question> {
    // Blank searches match everything; otherwise the raw query is used as typed.
    let needle = query
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_lowercase);

    let mut filtered: Vec<Question> = questions
        .iter()
        .filter(|q| query.category.matches(q.category))
        .filter(|q| match &needle {
            Some(n) => q.text.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .cloned()
        .collect();

    filtered.sort_by(|a, b| compare(a, b, query.sort, now_ms));
    filtered
}

/// Run an explore query, tagging whether the input were example questions.
pub fn explore(
    questions: &[Question],
    query: &ExploreQuery,
    now_ms: u64,
    examples: bool,
) -> ExploreResult {
    let filtered = filter_and_sort(questions, query, now_ms);
    ExploreResult {
        total: questions.len(),
        shown: filtered.len(),
        questions: filtered,
        examples,
    }
}
