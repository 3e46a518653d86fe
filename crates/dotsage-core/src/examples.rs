// Canned questions shown while the ledger is still empty.

use crate::question::{Category, Question};

const DAY_MS: u64 = 86_400_000;

/// (author, text, category, age in days, upvotes, downvotes)
const EXAMPLES: [(&str, &str, Category, u64, u32, u32); 5] = [
    (
        "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty",
        "How does Polkadot's shared security model work?",
        Category::Docs,
        1,
        12,
        2,
    ),
    (
        "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY",
        "What's the difference between a parachain and a parathread?",
        Category::Ecosystem,
        2,
        8,
        1,
    ),
    (
        "5FLSigC9HGRKVhB9FiEo4Y3koPsNmBmLJbpXg2mp1hXcS59Y",
        "How do I build a custom blockchain using the Polkadot SDK?",
        Category::Builders,
        3,
        15,
        0,
    ),
    (
        "5DAAnrj7VHTznn2AWBemMuyBwZWs6FNFjdyVXUeYum3hXF28",
        "What is OpenGov and how does it differ from the old governance system?",
        Category::Governance,
        4,
        20,
        3,
    ),
    (
        "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty",
        "How do I connect my wallet to interact with Polkadot dApps?",
        Category::Builders,
        5,
        6,
        1,
    ),
];

/// The example questions, ids 1..=5, dated one to five days before `now_ms`.
pub fn example_questions(now_ms: u64) -> Vec<Question> {
    EXAMPLES
        .iter()
        .zip(1u32..)
        .map(|(&(author, text, category, age_days, upvotes, downvotes), id)| Question {
            id,
            author: author.to_string(),
            text: text.to_string(),
            category,
            created_at: now_ms.saturating_sub(age_days * DAY_MS),
            upvotes,
            downvotes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_examples_with_sequential_ids() {
        let qs = example_questions(10 * DAY_MS);
        let ids: Vec<u32> = qs.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn examples_are_dated_relative_to_now() {
        let now = 10 * DAY_MS;
        let qs = example_questions(now);
        assert_eq!(qs[0].created_at, now - DAY_MS);
        assert_eq!(qs[4].created_at, now - 5 * DAY_MS);
    }

    #[test]
    fn examples_cover_every_category() {
        let qs = example_questions(10 * DAY_MS);
        for cat in Category::ALL {
            assert!(qs.iter().any(|q| q.category == cat), "missing {cat}");
        }
    }
}
