// Prompt text, documentation sources and the fallback answer.

use dotsage_core::question::Category;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Documentation sources
// ---------------------------------------------------------------------------

/// A documentation link returned alongside every answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

const DOCS_SOURCES: [(&str, &str); 3] = [
    ("Polkadot Wiki - Learn", "https://wiki.polkadot.network/"),
    ("Polkadot Documentation", "https://docs.polkadot.network/"),
    ("Substrate Documentation", "https://docs.substrate.io/"),
];

const BUILDERS_SOURCES: [(&str, &str); 3] = [
    (
        "Polkadot Builders Guide",
        "https://wiki.polkadot.network/docs/build-index",
    ),
    ("ink! Smart Contracts", "https://use.ink/"),
    ("Polkadot.js API", "https://polkadot.js.org/docs/"),
];

const GOVERNANCE_SOURCES: [(&str, &str); 3] = [
    (
        "OpenGov Overview",
        "https://wiki.polkadot.network/docs/learn-governance",
    ),
    (
        "Referenda Guide",
        "https://wiki.polkadot.network/docs/maintain-guides-democracy",
    ),
    (
        "Governance Best Practices",
        "https://wiki.polkadot.network/docs/learn-governance",
    ),
];

const ECOSYSTEM_SOURCES: [(&str, &str); 3] = [
    (
        "Parachains Overview",
        "https://wiki.polkadot.network/docs/learn-parachains",
    ),
    ("Polkadot Ecosystem", "https://polkadot.network/ecosystem/"),
    (
        "Parachain Teams",
        "https://wiki.polkadot.network/docs/learn-parachains",
    ),
];

/// The three documentation sources for a category, in display order.
pub fn sources(category: Category) -> Vec<Source> {
    let table = match category {
        Category::Docs => &DOCS_SOURCES,
        Category::Builders => &BUILDERS_SOURCES,
        Category::Governance => &GOVERNANCE_SOURCES,
        Category::Ecosystem => &ECOSYSTEM_SOURCES,
    };
    table
        .iter()
        .map(|(title, url)| Source {
            title: title.to_string(),
            url: url.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

/// System prompt for answering a question in `category`.
pub fn system_prompt(category: Category) -> String {
    format!(
        "You are DotSage, an AI assistant specialized in answering questions about Polkadot, Substrate, and the Web3 ecosystem. \n\
         \n\
         Your role:\n\
         - Provide accurate, concise answers based on Polkadot documentation and best practices\n\
         - Focus on the {category} category context\n\
         - Cite relevant documentation when possible\n\
         - If you're unsure, say so rather than guessing\n\
         - Keep answers clear and actionable\n\
         \n\
         Answer format (IMPORTANT - use clean HTML formatting):\n\
         - Use <h3> tags for main section headings\n\
         - Use <ul><li> for bullet lists (NOT markdown *)\n\
         - Use <strong> for emphasis (NOT markdown **)\n\
         - Use <p> tags to wrap paragraphs\n\
         - Do NOT use markdown syntax (*, **, #, etc.)\n\
         - Keep formatting clean and HTML-based\n\
         - Be concise but comprehensive (aim for 300-500 words)\n\
         - Include technical details when relevant"
    )
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Plain-text answer used when the model could not produce one.
pub fn fallback_answer(error: &str, question: &str, category: Category) -> String {
    format!(
        "I encountered an issue generating an AI response: {error}. \n\
         \n\
         For \"{question}\", I recommend checking the Polkadot documentation:\n\
         - Visit the official wiki: https://wiki.polkadot.network/\n\
         - Check the {category} category resources\n\
         - Search for related topics in the documentation\n\
         \n\
         If you have a GROQ_API_KEY set, please check that it's valid and the API is accessible."
    )
}
