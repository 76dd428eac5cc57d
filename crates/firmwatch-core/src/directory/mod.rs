//! Everything that talks to the lawyer directory.
//!
//! - `navigator`: the session contract and its timeout helper
//! - `client`: reqwest-backed sessions
//! - `markup` / `extract`: selector and text heuristics over result pages
//! - `crawler` / `probe`: the full crawl and the headcount check

pub mod client;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod markup;
pub mod navigator;
pub mod probe;

pub use client::{HttpNavigator, HttpSessionFactory};
pub use crawler::{CrawlOutput, CrawlProgress, CrawlRun, CrawlState, DirectoryCrawler, ProgressFn, Step};
pub use error::{CrawlError, NavigationError, ProbeError};
pub use navigator::{Navigator, SessionFactory};
pub use probe::{compare_headcount, HeadcountProbe};
