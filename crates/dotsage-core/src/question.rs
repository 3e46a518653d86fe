// Question records and their categories.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The four fixed question categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Docs,
    Builders,
    Governance,
    Ecosystem,
}

impl Category {
    /// All categories in storage-index order.
    pub const ALL: [Category; 4] = [
        Category::Docs,
        Category::Builders,
        Category::Governance,
        Category::Ecosystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Docs => "Docs",
            Category::Builders => "Builders",
            Category::Governance => "Governance",
            Category::Ecosystem => "Ecosystem",
        }
    }

    /// Stable index used by the ledger's storage format.
    pub fn index(&self) -> u32 {
        match self {
            Category::Docs => 0,
            Category::Builders => 1,
            Category::Governance => 2,
            Category::Ecosystem => 3,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the four category names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Exact, case-sensitive match on the category name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Question
// ---------------------------------------------------------------------------

/// A user-submitted question with its vote counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: u32,
    pub author: String,
    pub text: String,
    pub category: Category,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
    pub upvotes: u32,
    pub downvotes: u32,
}

impl Question {
    /// Net vote score. May be negative.
    pub fn score(&self) -> i64 {
        i64::from(self.upvotes) - i64::from(self.downvotes)
    }

    pub fn total_votes(&self) -> u64 {
        u64::from(self.upvotes) + u64::from(self.downvotes)
    }

    /// Increment the up or down counter, saturating at `u32::MAX`.
    pub fn apply_vote(&mut self, is_up: bool) {
        if is_up {
            self.upvotes = self.upvotes.saturating_add(1);
        } else {
            self.downvotes = self.downvotes.saturating_add(1);
        }
    }

    /// Build the shareable summary for this question.
    ///
    /// `public_url` is the origin of the public frontend; a trailing slash is
    /// tolerated.
    pub fn share_text(&self, public_url: &str) -> SharePayload {
        let url = format!(
            "{}/explore?q={}",
            public_url.trim_end_matches('/'),
            self.id
        );
        let text = format!(
            "Check out this Polkadot question on DotSage:\n\n\"{}\"\n\nCategory: {}\nScore: {} (\u{2191}{} / \u{2193}{})\n\n",
            self.text,
            self.category,
            self.score(),
            self.upvotes,
            self.downvotes,
        );
        SharePayload {
            title: format!("Question #{} - DotSage", self.id),
            text,
            url,
        }
    }
}

/// Title, body and link for sharing a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub url: String,
}
