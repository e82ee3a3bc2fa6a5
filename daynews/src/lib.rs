pub mod types;
pub mod config;
pub mod traits;
pub mod fetcher;
pub mod parser;
pub mod feed_manager;
pub mod normalizer;
pub mod assembler;
pub mod converter;
pub mod delivery;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod rss_utils;
pub mod sources;

pub use types::*;
pub use config::AppConfig;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use feed_manager::{FeedFetch, FeedManager};
pub use converter::{ConversionInvoker, EbookConvert};
pub use delivery::DeliveryDispatcher;
pub use lock::RunLock;
pub use pipeline::{Collaborators, Orchestrator, RunOutcome, RunStage};
pub use sources::HttpFeedSource;
pub use traits::{ConversionRequest, ConversionTool, FeedSource, ToolRun};
