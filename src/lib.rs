//! Representative frame selection over per-frame GPU hardware counter
//! tables, and counter collation/comparison for verifying
//! fast-forwarded replays.

pub mod collate;
pub mod compare;
pub mod config;
pub mod config_file;
pub mod counter_table;
pub mod features;
pub mod get_terminal_width;
pub mod kmeans;
pub mod representative;
pub mod schema;
pub mod utillib;
pub mod verify;
