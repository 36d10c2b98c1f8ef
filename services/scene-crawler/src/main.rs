//!
//! src/main.rs  Andrew Belles  Sept 13, 2025
//!
//! Entry point of the timestamp.trade crawler. Wires configuration,
//! logging, the response cache and the http client together and
//! runs the pipeline once.
//!

mod config;
mod errors;
mod logging;

mod crawler;
mod fetch;
mod parser;
mod persistent;
mod retry;
mod sink;
mod types;

use crate::errors::CrawlerError;

fn main() -> Result<(), CrawlerError> {
    let cfgs = config::load_config()?;
    let _logger = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service="scene-crawler",
        version=%env!("CARGO_PKG_VERSION"),
        base=%cfgs.site.base_url,
        output=%cfgs.output.dir.display(),
        "starting"
    );

    let client = fetch::TimestampClient::new(&cfgs.http, &cfgs.site)?;
    let cache  = persistent::ResponseCache::open(&cfgs.cache)?;
    let sink   = sink::JsonSink::new(&cfgs.output.dir);
    let limits = crawler::CrawlerLimits::from_config(&cfgs);

    let crawler = crawler::Crawler::new(client, cache, sink, limits)?;
    match crawler.run() {
        Ok(summary) => {
            tracing::info!(studios = summary.studios, scenes = summary.scenes, "finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "crawl failed");
            Err(e)
        }
    }
}
