//! Free-space probing and high-water mark gating.

mod free_space;
mod watcher;

pub use free_space::{parse_df_available_kb, DfFreeSpaceProvider, FreeSpaceProvider};
pub use watcher::{HighwaterMark, HighwaterMarkEvent, HighwaterMarkState, HighwaterMarkWatcher};
