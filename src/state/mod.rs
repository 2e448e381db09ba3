//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: URLs known from earlier runs plus URLs visited in the current run

mod crawl_state;

pub use crawl_state::CrawlState;
