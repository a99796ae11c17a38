//! # hub-rules
//!
//! The declarative condition/consequence rules engine (§4.4-§4.6): a
//! condition tree evaluator, a token finder and template renderer, consequence
//! application, and a rules downloader with an on-disk cache.
//!
//! The engine plugs into the hub purely through [`hub_core::PreProcessor`];
//! nothing in `hub-core` knows this crate exists.

mod condition;
mod consequence;
mod downloader;
mod engine;
mod matcher;
mod rule;
mod token;

pub use condition::Condition;
pub use consequence::Consequence;
pub use downloader::{
    ArchiveReader, DownloadError, FetchOutcome, ReqwestTransport, RulesDownloader, RulesTransport,
    Validators, ZipArchiveReader,
};
pub use engine::RulesEngine;
pub use matcher::{MatchOp, Matcher};
pub use rule::{parse_rule_document, Rule, RuleParseError};
pub use token::{StateLookup, TokenContext};
