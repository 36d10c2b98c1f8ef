//!
//! src/config.rs  Andrew Belles  Sept 13th, 2025
//!
//! Loads configuration for the crawler. Only the site location, output
//! directory and log format come from the environment, the cache and
//! worker pool are fixed constants.
//!

use std::{path::PathBuf, time};
use url::Url;

use crate::CrawlerError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 30000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 5000;
pub const HTTP_POOL_MAX_IDLE: usize = 40;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 1000;
pub const RETRY_JITTER: bool = false;

/// Constants for the response cache
pub const CACHE_DIRECTORY: &str = "cache_directory";
pub const CACHE_SIZE_LIMIT: u64 = 1 << 30;    // 1gb
pub const CACHE_CULL_LIMIT: u32 = 10;
pub const CACHE_COMPRESS_LEVEL: i32 = 1;

pub const WORKERS: usize = 40;

pub const DEFAULT_BASE_URL: &str = "https://timestamp.trade/";

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

///
/// Location of the site being crawled
///
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: Url,      // https://timestamp.trade/
}

fn parse_site(raw: &str) -> Result<SiteConfig, CrawlerError> {
    let mut base_url = Url::parse(raw)
        .map_err(|e| CrawlerError::Config(
            format!("TSTRADE_BASE_URL invalid {e}")
        ))?;

    ensure_https(&base_url).map_err(CrawlerError::Config)?;
    ensure_trailing_slash(&mut base_url);

    Ok( SiteConfig { base_url } )
}

fn build_site() -> Result<SiteConfig, CrawlerError> {
    let base_url = std::env::var("TSTRADE_BASE_URL")
        .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    parse_site(&base_url)
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub user_agent: String,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            user_agent: format!("scene-crawler/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for the on-disk response cache
///
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub size_limit: u64,        // bytes of stored values
    pub cull_limit: u32,        // entries evicted per round
    pub compress_level: i32
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(CACHE_DIRECTORY),
            size_limit: CACHE_SIZE_LIMIT,
            cull_limit: CACHE_CULL_LIMIT,
            compress_level: CACHE_COMPRESS_LEVEL
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    pub workers: usize
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { workers: WORKERS }
    }
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf
}

fn build_output() -> OutputConfig {
    let dir = std::env::var("TSTRADE_OUTPUT_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| ".".to_string());
    OutputConfig { dir: PathBuf::from(dir) }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<LogFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json"   => Some(LogFormat::Json),
            _ => None
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,scene_crawler=debug,reqwest=warn".to_string(),
            format: LogFormat::Pretty,
            with_ansi: true,
            include_file_line: false,
            include_target: true,
        }
    }
}

fn build_logging() -> Result<LoggingConfig, CrawlerError> {
    let mut logging = LoggingConfig::default();
    if let Ok(raw) = std::env::var("LOG_FORMAT") {
        logging.format = LogFormat::parse(&raw)
            .ok_or_else(|| CrawlerError::Config(
                format!("LOG_FORMAT must be pretty or json (got {raw})")
            ))?;
    }
    if logging.format == LogFormat::Json {
        logging.with_ansi = false;
        logging.include_file_line = true;
    }
    Ok(logging)
}

///
/// AppConfig which holds everything the crawler needs
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub concurrency: ConcurrencyConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, CrawlerError> {
    dotenvy::dotenv().ok();

    let site        = build_site()?;
    let http        = HttpConfig::default();
    let cache       = CacheConfig::default();
    let concurrency = ConcurrencyConfig::default();
    let output      = build_output();
    let logging     = build_logging()?;

    Ok( AppConfig { site, http, cache, concurrency, output, logging } )
}
