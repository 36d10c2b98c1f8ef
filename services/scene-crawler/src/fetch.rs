//!
//! src/fetch.rs  Andrew Belles  Sept 10th, 2025
//!
//! Defines methods for hitting timestamp.trade endpoints and
//! returning unparsed data. Retries and caching are layered on
//! top by the crawler, this module only speaks HTTP.
//!

use url::Url;
use reqwest::blocking::{Client, ClientBuilder, RequestBuilder};
use reqwest::{header, redirect};

use crate::config::{HttpConfig, SiteConfig};
use crate::types::{SceneId, StudioId};
use crate::CrawlerError;

/// Everything the crawler needs from the site. Shared by every worker
/// in the pool, hence Sync.
pub trait Source: Sync {
    /// Raw markup of the studio listing page
    fn studio_listing(&self) -> Result<String, CrawlerError>;
    /// Decoded JSON body for one studio, carries a `scenes` list
    fn studio(&self, studio_id: &StudioId) -> Result<serde_json::Value, CrawlerError>;
    /// Raw markup of one scene page
    fn scene(&self, scene_id: &SceneId) -> Result<String, CrawlerError>;
}

/// Client building functionality
fn client_helper(http: &HttpConfig) -> ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers_and_agent(
    http: &HttpConfig,
    headers: header::HeaderMap,
    user_agent: &str
) -> Result<Client, CrawlerError> {
    client_helper(http)
        .default_headers(headers)
        .user_agent(user_agent)
        .build()
        .map_err(|e| CrawlerError::Http(format!("build client: {e}")))
}

#[derive(Clone, Debug)]
pub struct TimestampClient {
    pub http: Client,
    pub base: Url
}

impl TimestampClient {
    pub fn new(http_config: &HttpConfig, site: &SiteConfig) -> Result<Self, CrawlerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8")
        );
        let http = client_with_headers_and_agent(
            http_config, headers, &http_config.user_agent
        )?;
        Ok( Self { http, base: site.base_url.clone() } )
    }

    fn endpoint(&self, path: &str) -> Result<Url, CrawlerError> {
        self.base.join(path)
            .map_err(|e| CrawlerError::Config(format!("bad endpoint {path}: {e}")))
    }

    /// GET /studios
    pub fn studios(&self) -> Result<RequestBuilder, CrawlerError> {
        Ok( self.http.get(self.endpoint("studios")?) )
    }

    /// GET /json-studio/{id}
    pub fn studio_json(&self, studio_id: &StudioId) -> Result<RequestBuilder, CrawlerError> {
        Ok( self.http.get(self.endpoint(&format!("json-studio/{studio_id}"))?) )
    }

    /// GET /scene/{id}
    pub fn scene_page(&self, scene_id: &SceneId) -> Result<RequestBuilder, CrawlerError> {
        Ok( self.http.get(self.endpoint(&format!("scene/{scene_id}"))?) )
    }
}

impl Source for TimestampClient {
    fn studio_listing(&self) -> Result<String, CrawlerError> {
        let resp = self.studios()?.send()?.error_for_status()?;
        Ok( resp.text()? )
    }

    fn studio(&self, studio_id: &StudioId) -> Result<serde_json::Value, CrawlerError> {
        let resp = self.studio_json(studio_id)?.send()?.error_for_status()?;
        Ok( resp.json::<serde_json::Value>()? )
    }

    fn scene(&self, scene_id: &SceneId) -> Result<String, CrawlerError> {
        let resp = self.scene_page(scene_id)?.send()?.error_for_status()?;
        Ok( resp.text()? )
    }
}
