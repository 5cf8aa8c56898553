pub mod catalogs;
pub mod config;
pub mod correlate;
pub mod crc;
