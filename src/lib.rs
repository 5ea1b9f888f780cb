pub mod cli;
pub mod codec;
pub mod commit;
pub mod config;
pub mod dump;
pub mod env;
pub mod error;
pub mod flock;
pub mod hasher;
pub mod journal;
pub mod select;
pub mod store;

pub use config::EnvConfig;
pub use env::{EnvRecord, UpdateState};
pub use error::{Error, Result};
pub use hasher::Hasher;
pub use journal::Journal;
pub use select::SelectMode;
pub use store::{DirStore, RecordStore};
