//! CLI domain: parse, route, output, and presentation only.
//! No pipeline logic; a single route table dispatches to the pipeline and store.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_records_json, format_records_text, format_replay_summary_text, ReplaySummary,
};
pub use route::RunContext;
