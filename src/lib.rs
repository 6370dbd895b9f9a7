pub mod analysis;
pub mod config;
pub mod db;
pub mod extract_error;
pub mod extractor;
pub mod importers;
pub mod normalizer;
pub mod services;
pub mod stations;
pub mod utils;
