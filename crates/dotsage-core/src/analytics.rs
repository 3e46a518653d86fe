// Aggregate statistics over a question list and per-author profiles.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::question::{Category, Question};

/// How many entries the top-N lists keep.
pub const TOP_N: usize = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTotals {
    pub upvotes: u64,
    pub downvotes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub address: String,
    pub question_count: usize,
    pub votes: u64,
}

/// Site-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_questions: usize,
    pub total_users: usize,
    pub total_votes: u64,
    pub category_counts: BTreeMap<Category, usize>,
    pub category_votes: BTreeMap<Category, VoteTotals>,
    pub top_questions: Vec<Question>,
    pub top_users: Vec<UserActivity>,
    pub recent_activity: Vec<Question>,
}

/// Statistics for a single author.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub address: String,
    pub questions: Vec<Question>,
    pub question_count: usize,
    pub total_votes: u64,
    pub total_score: i64,
    pub categories: BTreeMap<Category, usize>,
}

/// Why a profile could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Invalid address")]
    InvalidAddress,
    #[error("No questions found for this address")]
    NoQuestions,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

fn zeroed<T: Default>() -> BTreeMap<Category, T> {
    Category::ALL.into_iter().map(|c| (c, T::default())).collect()
}

/// Compute site-wide analytics. Every category appears in the per-category
/// maps, with zero when unused.
pub fn compute(questions: &[Question]) -> Analytics {
    let total_users = questions
        .iter()
        .map(|q| q.author.as_str())
        .collect::<HashSet<_>>()
        .len();
    let total_votes = questions.iter().map(Question::total_votes).sum();

    let mut category_counts: BTreeMap<Category, usize> = zeroed();
    let mut category_votes: BTreeMap<Category, VoteTotals> = zeroed();
    for q in questions {
        *category_counts.entry(q.category).or_default() += 1;
        let totals = category_votes.entry(q.category).or_default();
        totals.upvotes += u64::from(q.upvotes);
        totals.downvotes += u64::from(q.downvotes);
    }

    let mut top_questions = questions.to_vec();
    top_questions.sort_by(|a, b| b.score().cmp(&a.score()));
    top_questions.truncate(TOP_N);

    let mut recent_activity = questions.to_vec();
    recent_activity.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent_activity.truncate(TOP_N);

    Analytics {
        total_questions: questions.len(),
        total_users,
        total_votes,
        category_counts,
        category_votes,
        top_questions,
        top_users: top_users(questions),
        recent_activity,
    }
}

/// Authors ranked by question count, then by votes received. Ties keep the
/// order in which authors first appear.
fn top_users(questions: &[Question]) -> Vec<UserActivity> {
    let mut users: Vec<UserActivity> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for q in questions {
        let slot = *index.entry(q.author.as_str()).or_insert_with(|| {
            users.push(UserActivity {
                address: q.author.clone(),
                question_count: 0,
                votes: 0,
            });
            users.len() - 1
        });
        users[slot].question_count += 1;
        users[slot].votes += q.total_votes();
    }

    users.sort_by(|a, b| {
        b.question_count
            .cmp(&a.question_count)
            .then(b.votes.cmp(&a.votes))
    });
    users.truncate(TOP_N);
    users
}

/// Build the profile of `address`, matched case-insensitively against
/// question authors. Questions come back newest first.
pub fn user_profile(questions: &[Question], address: &str) -> Result<UserProfile, ProfileError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ProfileError::InvalidAddress);
    }
    let wanted = address.to_lowercase();

    let mut mine: Vec<Question> = questions
        .iter()
        .filter(|q| q.author.to_lowercase() == wanted)
        .cloned()
        .collect();
    if mine.is_empty() {
        return Err(ProfileError::NoQuestions);
    }
    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut categories: BTreeMap<Category, usize> = zeroed();
    for q in &mine {
        *categories.entry(q.category).or_default() += 1;
    }

    Ok(UserProfile {
        address: address.to_string(),
        question_count: mine.len(),
        total_votes: mine.iter().map(Question::total_votes).sum(),
        total_score: mine.iter().map(Question::score).sum(),
        categories,
        questions: mine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: u32, author: &str, category: Category, created_at: u64, up: u32, down: u32) -> Question {
        Question {
            id,
            author: author.to_string(),
            text: format!("question {id}"),
            category,
            created_at,
            upvotes: up,
            downvotes: down,
        }
    }

    fn fixture() -> Vec<Question> {
        vec![
            q(0, "alice", Category::Docs, 100, 5, 1),
            q(1, "bob", Category::Governance, 200, 1, 3),
            q(2, "alice", Category::Docs, 300, 0, 0),
            q(3, "carol", Category::Builders, 400, 9, 0),
            q(4, "bob", Category::Docs, 500, 2, 2),
            q(5, "dave", Category::Ecosystem, 600, 1, 0),
            q(6, "erin", Category::Ecosystem, 700, 0, 1),
        ]
    }

    #[test]
    fn totals_and_unique_users() {
        let a = compute(&fixture());
        assert_eq!(a.total_questions, 7);
        assert_eq!(a.total_users, 5);
        assert_eq!(a.total_votes, 6 + 4 + 0 + 9 + 4 + 1 + 1);
    }

    #[test]
    fn per_category_counts_and_votes() {
        let a = compute(&fixture());
        assert_eq!(a.category_counts[&Category::Docs], 3);
        assert_eq!(a.category_counts[&Category::Builders], 1);
        assert_eq!(a.category_counts[&Category::Governance], 1);
        assert_eq!(a.category_counts[&Category::Ecosystem], 2);
        assert_eq!(
            a.category_votes[&Category::Docs],
            VoteTotals {
                upvotes: 7,
                downvotes: 3
            }
        );
    }

    #[test]
    fn empty_input_has_all_categories_zeroed() {
        let a = compute(&[]);
        assert_eq!(a.total_questions, 0);
        assert_eq!(a.category_counts.len(), 4);
        assert!(a.category_counts.values().all(|&n| n == 0));
        assert!(a.top_questions.is_empty());
        assert!(a.top_users.is_empty());
    }

    #[test]
    fn top_questions_by_score_capped_at_five() {
        let a = compute(&fixture());
        let ids: Vec<u32> = a.top_questions.iter().map(|q| q.id).collect();
        // scores: 0:4 1:-2 2:0 3:9 4:0 5:1 6:-1
        assert_eq!(ids, vec![3, 0, 5, 2, 4]);
    }

    #[test]
    fn top_users_by_count_then_votes() {
        let a = compute(&fixture());
        let addrs: Vec<&str> = a.top_users.iter().map(|u| u.address.as_str()).collect();
        // alice 2q/6v, bob 2q/8v, carol 1q/9v, dave 1q/1v, erin 1q/1v
        assert_eq!(addrs, vec!["bob", "alice", "carol", "dave", "erin"]);
        assert_eq!(a.top_users[0].question_count, 2);
        assert_eq!(a.top_users[0].votes, 8);
    }

    #[test]
    fn recent_activity_newest_first() {
        let a = compute(&fixture());
        let ids: Vec<u32> = a.recent_activity.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn analytics_json_shape() {
        let v = serde_json::to_value(compute(&fixture())).unwrap();
        assert_eq!(v["totalQuestions"], 7);
        assert_eq!(v["categoryCounts"]["Docs"], 3);
        assert_eq!(v["categoryVotes"]["Docs"]["upvotes"], 7);
        assert_eq!(v["topUsers"][0]["questionCount"], 2);
    }

    #[test]
    fn profile_matches_case_insensitively() {
        let profile = user_profile(&fixture(), "ALICE").unwrap();
        assert_eq!(profile.question_count, 2);
        let ids: Vec<u32> = profile.questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![2, 0]);
        assert_eq!(profile.total_votes, 6);
        assert_eq!(profile.total_score, 4);
        assert_eq!(profile.categories[&Category::Docs], 2);
        assert_eq!(profile.categories[&Category::Governance], 0);
    }

    #[test]
    fn profile_errors() {
        assert_eq!(
            user_profile(&fixture(), "   "),
            Err(ProfileError::InvalidAddress)
        );
        assert_eq!(
            user_profile(&fixture(), "mallory"),
            Err(ProfileError::NoQuestions)
        );
    }

    #[test]
    fn profile_error_messages() {
        assert_eq!(ProfileError::InvalidAddress.to_string(), "Invalid address");
        assert_eq!(
            ProfileError::NoQuestions.to_string(),
            "No questions found for this address"
        );
    }
}
