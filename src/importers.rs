pub mod gauge_history;

pub use gauge_history::{parse_history_csv, parse_history_timestamp, read_history_dir, HistoryError};
