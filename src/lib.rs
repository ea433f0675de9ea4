//! dltidy - keeps a downloads folder sorted
//!
//! This library classifies files by extension, moves them into per-category
//! directories without ever overwriting anything, skips files that are still
//! being downloaded, and can re-run the sweep whenever the folder changes.

pub mod checksum;
pub mod cli;
pub mod collision;
pub mod config;
pub mod exclusion;
pub mod file_category;
pub mod logging;
pub mod mover;
pub mod output;
pub mod report;
pub mod sweeper;
pub mod watch;

pub use collision::CollisionResolver;
pub use config::{Config, ConfigError, Settings};
pub use exclusion::TempExclusionSet;
pub use file_category::{Category, CategoryRule, ExtensionClassifier};
pub use mover::{DestinationSet, MoveError, MoveOutcome, SafeMover, SkipReason, SourceEntry};
pub use report::{SweepReporter, dispatch_reports};
pub use sweeper::{DirectorySweeper, SweepError, SweepResult};
pub use watch::{ChangeTrigger, SweepSignal, WatchBackend};

pub use cli::{Cli, RunStatus, run_cli};
