//!
//! src/errors.rs  Andrew Belles  Sept 13th, 2025
//!
//! Defines enums and methods of error conversion
//! for errors the crawler uses
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("worker pool error: {0}")]
    Pool(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl CrawlerError {
    /// Only network/status failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlerError::Http(_))
    }
}

impl From<reqwest::Error> for CrawlerError {
    fn from(e: reqwest::Error) -> Self { CrawlerError::Http(e.to_string()) }
}

impl From<serde_json::Error> for CrawlerError {
    fn from(e: serde_json::Error) -> Self { CrawlerError::Parse(e.to_string()) }
}

impl From<rusqlite::Error> for CrawlerError {
    fn from(e: rusqlite::Error) -> Self { CrawlerError::Cache(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_is_transient() {
        assert!(CrawlerError::Http("503".to_string()).is_transient());
        assert!(!CrawlerError::Parse("bad".to_string()).is_transient());
        assert!(!CrawlerError::Cache("locked".to_string()).is_transient());
        assert!(!CrawlerError::Config("unset".to_string()).is_transient());
    }
}
