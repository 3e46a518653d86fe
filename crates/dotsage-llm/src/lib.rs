// Library root: the Groq streaming client, prompt text, Markdown formatting
// and the answer service built on top of them.

pub mod answer;
pub mod client;
pub mod markdown;
pub mod prompt;

pub use answer::{Answer, AnswerService, Answerer};
pub use prompt::Source;
