//! firmwatch core library.
//!
//! Tracks law-firm rosters from a public lawyer directory and turns roster
//! snapshots into JOIN / LEAVE / TRANSFER events.
//!
//! - `directory`: the search session, crawler and headcount probe
//! - `normalize`: validation and reshaping of crawled rows
//! - `classifier`: roster diffing and transfer correlation
//! - `store`: the persistence trait with in-memory and JSON file stores
//! - `batch`: the probe-then-crawl driver

pub mod batch;
pub mod classifier;
pub mod config;
pub mod directory;
pub mod models;
pub mod normalize;
pub mod store;
pub mod utils;

pub use batch::{BatchError, BatchRunner, OrganizationResult, RunOptions, RunSummary};
pub use classifier::{Classification, MovementClassifier, TRANSFER_WINDOW_DAYS};
pub use config::{Config, ConfigError, Pacing};
pub use directory::{
    CrawlError, DirectoryCrawler, HeadcountProbe, HttpSessionFactory, Navigator, NavigationError, ProbeError,
    SessionFactory,
};
pub use store::{JsonFileStore, MemoryStore, RosterStore, StoreError};
