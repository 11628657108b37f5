mod competitor_scorer;
mod dispatcher;
mod reporter;
mod summarizer;

pub use competitor_scorer::{authority_score, score_competitors};
pub use dispatcher::{Dispatcher, ProgressFn, ProgressPhase};
pub use reporter::aggregate_domains;
pub use summarizer::summarize;
