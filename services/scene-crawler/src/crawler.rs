//!
//! src/crawler.rs  Andrew Belles  Sept 13th, 2025
//!
//! Defines the crawler pipeline: enumerate studios, fetch each studio,
//! collect scene ids, fetch and parse each scene, and dump snapshots.
//! Every network call goes through the cache first and the retry
//! policy second, fan-out runs on a fixed size thread pool.
//!

use std::collections::HashSet;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::CrawlerError;
use crate::fetch::Source;
use crate::parser;
use crate::persistent::ResponseCache;
use crate::retry::{with_retry, RetryPolicy};
use crate::sink::{JsonSink, Snapshot};
use crate::types::{SceneId, SceneRecord, StudioId};

// Cache namespaces, one per memoized network call
const STUDIO_LISTING_FN: &str = "get_studio_hashes";
const STUDIO_DATA_FN: &str = "get_studio_data";
const SCENE_DATA_FN: &str = "fetch_scene_data";

#[derive(Clone, Debug)]
pub struct CrawlerLimits {
    pub workers: usize,
    pub retry: RetryPolicy
}

impl CrawlerLimits {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            workers: cfg.concurrency.workers,
            retry: RetryPolicy::from(&cfg.http.retry)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub studios: usize,
    pub scenes: usize
}

/// Flattens every studio's `scenes` list, keeping the first occurrence
/// of each id
pub fn collect_scene_ids(studios: &[(StudioId, Value)]) -> Vec<SceneId> {
    let mut seen = HashSet::new();
    let mut scene_ids = Vec::new();
    for (studio_id, record) in studios {
        let Some(scenes) = record.get("scenes").and_then(Value::as_array) else {
            warn!(studio = %studio_id, "studio.no_scenes");
            continue;
        };
        for scene in scenes {
            match scene.as_str() {
                Some(id) if seen.insert(id.to_string()) => {
                    scene_ids.push(SceneId(id.to_string()));
                }
                Some(_) => {}
                None => debug!(studio = %studio_id, entry = %scene, "studio.bad_scene_entry")
            }
        }
    }
    scene_ids
}

fn progress_bar(len: usize, label: &'static str) -> Result<ProgressBar, CrawlerError> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .map_err(|e| CrawlerError::Config(format!("progress template: {e}")))?
            .progress_chars("#>-"),
    );
    pb.set_message(label);
    Ok(pb)
}

pub struct Crawler<S: Source> {
    source: S,
    cache: ResponseCache,
    sink: JsonSink,
    limits: CrawlerLimits,
    pool: rayon::ThreadPool
}

impl<S: Source> Crawler<S> {
    pub fn new(
        source: S,
        cache: ResponseCache,
        sink: JsonSink,
        limits: CrawlerLimits
    ) -> Result<Self, CrawlerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limits.workers.max(1))
            .thread_name(|i| format!("crawler-{i}"))
            .build()
            .map_err(|e| CrawlerError::Pool(format!("build pool: {e}")))?;

        Ok( Self { source, cache, sink, limits, pool } )
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Studio ids from the listing page
    pub fn studio_ids(&self) -> Result<Vec<StudioId>, CrawlerError> {
        self.cache.memoize(STUDIO_LISTING_FN, "", || {
            with_retry(&self.limits.retry, "studios", || {
                let html = self.source.studio_listing()?;
                Ok(parser::studio_ids(&html))
            })
        })
    }

    pub fn studio(&self, studio_id: &StudioId) -> Result<Value, CrawlerError> {
        self.cache.memoize(STUDIO_DATA_FN, &studio_id.0, || {
            with_retry(&self.limits.retry, "studio", || self.source.studio(studio_id))
        })
    }

    pub fn scene_html(&self, scene_id: &SceneId) -> Result<String, CrawlerError> {
        self.cache.memoize(SCENE_DATA_FN, &scene_id.0, || {
            with_retry(&self.limits.retry, "scene", || self.source.scene(scene_id))
        })
    }

    /// Markup is cached, the parse is redone every run
    pub fn scene(&self, scene_id: &SceneId) -> Result<SceneRecord, CrawlerError> {
        let html = self.scene_html(scene_id)?;
        Ok(parser::parse_scene(&html))
    }

    ///
    /// Map f over items on the worker pool. Results come back in input
    /// order, the first error fails the whole batch.
    ///
    pub fn par_fetch<I, T, F>(&self, items: &[I], label: &'static str, f: F) ->
        Result<Vec<T>, CrawlerError>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> Result<T, CrawlerError> + Sync + Send
    {
        let pb = progress_bar(items.len(), label)?;
        // workers log under the caller's span (run_id) and subscriber
        let span = tracing::Span::current();
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        let results = self.pool.install(|| {
            items.par_iter()
                .map(|item| {
                    let out = tracing::dispatcher::with_default(&dispatch, || {
                        let _enter = span.enter();
                        f(item)
                    });
                    pb.inc(1);
                    out
                })
                .collect::<Result<Vec<T>, CrawlerError>>()
        });

        match &results {
            Ok(_) => pb.finish_and_clear(),
            Err(_) => pb.abandon()
        }
        results
    }

    pub fn run(&self) -> Result<RunSummary, CrawlerError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("crawl", %run_id);
        let _enter = span.enter();

        info!(workers = self.pool.current_num_threads(), "crawler.start");

        let studio_ids = self.studio_ids()?;
        self.sink.write_json(Snapshot::StudioHashes, &studio_ids)?;
        info!(count = studio_ids.len(), file = Snapshot::StudioHashes.file_name(), "crawler.saved");

        let studio_data = self.par_fetch(&studio_ids, "Scraping studios", |id| self.studio(id))?;
        let studio_pairs: Vec<(StudioId, Value)> = studio_ids.into_iter()
            .zip(studio_data)
            .collect();
        self.sink.write_json(Snapshot::StudioData, &studio_pairs)?;
        info!(count = studio_pairs.len(), file = Snapshot::StudioData.file_name(), "crawler.saved");

        let scene_ids = collect_scene_ids(&studio_pairs);
        self.sink.write_json(Snapshot::SceneHashes, &scene_ids)?;
        info!(count = scene_ids.len(), file = Snapshot::SceneHashes.file_name(), "crawler.saved");

        let scene_data = self.par_fetch(&scene_ids, "Scraping studio scenes", |id| self.scene(id))?;
        let scene_pairs: Vec<(SceneId, SceneRecord)> = scene_ids.into_iter()
            .zip(scene_data)
            .collect();
        self.sink.write_json(Snapshot::SceneData, &scene_pairs)?;
        info!(count = scene_pairs.len(), file = Snapshot::SceneData.file_name(), "crawler.saved");

        let (entries, bytes) = (self.cache.len()?, self.cache.volume()?);
        info!(entries, bytes, "cache.stats");

        let summary = RunSummary { studios: studio_pairs.len(), scenes: scene_pairs.len() };
        info!(studios = summary.studios, scenes = summary.scenes, "crawler.exit");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tempfile::tempdir;

    use crate::config::CacheConfig;

    /// In-process stand-in for the site that counts every request
    #[derive(Default)]
    struct FakeSite {
        listing: String,
        studios: HashMap<String, Value>,
        scenes: HashMap<String, String>,
        calls: AtomicUsize
    }

    impl FakeSite {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Source for FakeSite {
        fn studio_listing(&self) -> Result<String, CrawlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.listing.clone())
        }

        fn studio(&self, studio_id: &StudioId) -> Result<Value, CrawlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.studios.get(&studio_id.0)
                .cloned()
                .ok_or_else(|| CrawlerError::Http(format!("404 json-studio/{studio_id}")))
        }

        fn scene(&self, scene_id: &SceneId) -> Result<String, CrawlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.scenes.get(&scene_id.0)
                .cloned()
                .ok_or_else(|| CrawlerError::Http(format!("500 scene/{scene_id}")))
        }
    }

    fn scene_page(title: &str) -> String {
        format!(r#"
            <html><body><div class="main">
              <h3>{title}</h3>
              <h4>tags</h4><ul><li><a href="/tag/1">Outdoor</a></li></ul>
              <p>{title} description</p>
            </div></body></html>
        "#)
    }

    fn two_studio_site() -> FakeSite {
        let mut site = FakeSite {
            listing: r#"<a href="/studio/a1">A</a><a href="/studio/b2">B</a>"#.to_string(),
            ..Default::default()
        };
        site.studios.insert("a1".into(), json!({"scenes": ["s1", "s2"]}));
        site.studios.insert("b2".into(), json!({"scenes": ["s1", "s2"]}));
        site.scenes.insert("s1".into(), scene_page("First"));
        site.scenes.insert("s2".into(), scene_page("Second"));
        site
    }

    fn limits() -> CrawlerLimits {
        CrawlerLimits {
            workers: 4,
            retry: RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
                jitter: false
            }
        }
    }

    fn crawler(site: FakeSite, root: &std::path::Path) -> Result<Crawler<FakeSite>, CrawlerError> {
        let cache = ResponseCache::open(&CacheConfig {
            directory: root.join("cache_directory"),
            ..CacheConfig::default()
        })?;
        let sink = JsonSink::new(root.join("out"));
        Crawler::new(site, cache, sink, limits())
    }

    fn read(root: &std::path::Path, kind: Snapshot) -> Result<String, CrawlerError> {
        Ok(std::fs::read_to_string(root.join("out").join(kind.file_name()))?)
    }

    #[test]
    fn two_studios_share_scenes() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let crawler = crawler(two_studio_site(), dir.path())?;
        let summary = crawler.run()?;
        assert_eq!(summary, RunSummary { studios: 2, scenes: 2 });

        let studios: Vec<String> = serde_json::from_str(&read(dir.path(), Snapshot::StudioHashes)?)?;
        assert_eq!(studios, vec!["a1", "b2"]);

        let scenes: Vec<String> = serde_json::from_str(&read(dir.path(), Snapshot::SceneHashes)?)?;
        assert_eq!(scenes, vec!["s1", "s2"]);

        let data: Value = serde_json::from_str(&read(dir.path(), Snapshot::StudioData)?)?;
        assert_eq!(data[1][0], "b2");
        assert_eq!(data[1][1]["scenes"], json!(["s1", "s2"]));

        let records: Vec<(SceneId, SceneRecord)> =
            serde_json::from_str(&read(dir.path(), Snapshot::SceneData)?)?;
        assert_eq!(records[0].0, SceneId::from("s1"));
        assert_eq!(records[0].1.title, "First");
        assert_eq!(records[1].1.description, "Second description");
        assert_eq!(records[1].1.tags[0].tag_name, "Outdoor");

        // 1 listing + 2 studios + 2 scenes
        assert_eq!(crawler.source().calls(), 5);
        Ok(())
    }

    #[test]
    fn warm_cache_rerun_is_identical_and_offline() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let kinds = [
            Snapshot::StudioHashes, Snapshot::StudioData,
            Snapshot::SceneHashes, Snapshot::SceneData
        ];

        crawler(two_studio_site(), dir.path())?.run()?;
        let first: Vec<String> = kinds.iter()
            .map(|k| read(dir.path(), *k))
            .collect::<Result<_, _>>()?;

        // nothing is served on the second pass, every answer must be cached
        let rerun = crawler(FakeSite::default(), dir.path())?;
        rerun.run()?;
        let second: Vec<String> = kinds.iter()
            .map(|k| read(dir.path(), *k))
            .collect::<Result<_, _>>()?;

        assert_eq!(first, second);
        assert_eq!(rerun.source().calls(), 0);
        Ok(())
    }

    #[test]
    fn exhausted_scene_fails_the_batch() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let mut site = two_studio_site();
        site.scenes.remove("s2");

        let crawler = crawler(site, dir.path())?;
        let err = crawler.run().unwrap_err();
        assert!(matches!(err, CrawlerError::Http(_)));

        // earlier snapshots were written, the final one was not
        assert!(read(dir.path(), Snapshot::SceneHashes).is_ok());
        assert!(read(dir.path(), Snapshot::SceneData).is_err());

        // the failing scene was tried three times and never cached
        assert!(crawler.cache.get::<String>("fetch_scene_data:s2")?.is_none());
        assert!(crawler.source().calls() >= 1 + 2 + 3);
        Ok(())
    }

    #[test]
    fn scene_ids_dedup_in_first_seen_order() {
        let studios = vec![
            (StudioId::from("a"), json!({"scenes": ["s3", "s1"]})),
            (StudioId::from("b"), json!({"name": "no scenes key"})),
            (StudioId::from("c"), json!({"scenes": ["s1", 42, "s2", "s3"]})),
        ];
        let ids = collect_scene_ids(&studios);
        assert_eq!(ids, vec![SceneId::from("s3"), SceneId::from("s1"), SceneId::from("s2")]);
    }

    #[test]
    fn workers_log_inside_the_run_span() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let crawler = crawler(FakeSite::default(), dir.path())?;
        let items: Vec<u64> = (0..16).collect();

        let names = tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = info_span!("crawl", run_id = "r-1");
            let _enter = span.enter();
            crawler.par_fetch(&items, "test", |_| {
                Ok(tracing::Span::current().metadata().map(|m| m.name()))
            })
        })?;
        assert!(names.iter().all(|n| *n == Some("crawl")), "{names:?}");
        Ok(())
    }

    #[test]
    fn par_fetch_keeps_input_order() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let crawler = crawler(FakeSite::default(), dir.path())?;
        let items: Vec<u64> = (0..64).collect();

        let out = crawler.par_fetch(&items, "test", |n| {
            std::thread::sleep(Duration::from_micros((64 - n) * 50));
            Ok(n * 2)
        })?;
        assert_eq!(out, items.iter().map(|n| n * 2).collect::<Vec<_>>());
        Ok(())
    }
}
