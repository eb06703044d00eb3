// tests/fetch_mirrors.rs

//! Mirror fallback and latency ranking against in-process HTTP servers.

mod common;

use aura_install::fetch::{
    CatalogSource, MirrorSource, ReleaseCatalogClient, ReleaseChannel, ResilientFetcher, mirrors_from,
    no_progress,
};
use aura_install::session::CancelToken;
use common::{MirrorMode, MirrorServer};
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

fn files() -> HashMap<String, Vec<u8>> {
    HashMap::from([("v1.0.0/aura.zip".to_string(), b"payload bytes".to_vec())])
}

fn fetcher() -> ResilientFetcher {
    ResilientFetcher::new(Duration::from_secs(5), Duration::from_millis(500)).unwrap()
}

#[test]
fn test_falls_through_to_next_mirror_and_stops() {
    let a = MirrorServer::start(files(), MirrorMode::Fail);
    let b = MirrorServer::start(files(), MirrorMode::Serve);
    let c = MirrorServer::start(files(), MirrorMode::Serve);
    let mirrors = mirrors_from(&[a.base.clone(), b.base.clone(), c.base.clone()]);

    let tmp = tempfile::tempdir().unwrap();
    let path = fetcher()
        .fetch("aura.zip", "v1.0.0", &mirrors, tmp.path(), &no_progress, &CancelToken::new())
        .unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"payload bytes");
    assert_eq!(a.hits().len(), 1);
    assert_eq!(b.hits(), vec!["GET /dl/v1.0.0/aura.zip".to_string()]);
    assert!(c.hits().is_empty());
    assert!(!tmp.path().join("aura.zip.part").exists());
}

#[test]
fn test_every_mirror_failing_is_exhausted() {
    let a = MirrorServer::start(files(), MirrorMode::Fail);
    let b = MirrorServer::start(HashMap::new(), MirrorMode::Serve);
    let mirrors = mirrors_from(&[a.base.clone(), b.base.clone()]);

    let tmp = tempfile::tempdir().unwrap();
    let err = fetcher()
        .fetch("aura.zip", "v1.0.0", &mirrors, tmp.path(), &no_progress, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(
        err,
        aura_install::Error::AcquisitionExhausted { attempts: 2, .. }
    ));
    assert_eq!(err.exit_code(), 4);
    assert!(!tmp.path().join("aura.zip").exists());
}

#[test]
fn test_progress_reports_total() {
    let server = MirrorServer::start(files(), MirrorMode::Serve);
    let seen = Mutex::new(Vec::new());
    let tmp = tempfile::tempdir().unwrap();

    fetcher()
        .fetch(
            "aura.zip",
            "v1.0.0",
            &mirrors_from(&[server.base.clone()]),
            tmp.path(),
            &|done, total, _name| seen.lock().unwrap().push((done, total)),
            &CancelToken::new(),
        )
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.last(), Some(&(13, 13)));
}

#[test]
fn test_ranking_puts_slow_and_dead_mirrors_last() {
    let slow = MirrorServer::start_with_delay(files(), MirrorMode::Serve, Duration::from_millis(200));
    let dead = MirrorServer::start(files(), MirrorMode::Fail);
    let fast = MirrorServer::start(files(), MirrorMode::Serve);
    let mirrors = mirrors_from(&[slow.base.clone(), dead.base.clone(), fast.base.clone()]);

    let ranked = fetcher().rank_mirrors(&mirrors, "v1.0.0", "aura.zip");
    let order: Vec<&str> = ranked.iter().map(|m| m.base_location.as_str()).collect();
    assert_eq!(order, vec![fast.base.as_str(), slow.base.as_str(), dead.base.as_str()]);
    assert!(ranked[0].measured_latency.is_some());
    assert!(ranked[2].measured_latency.is_none());
    assert!(fast.hits().iter().all(|hit| hit.starts_with("HEAD ")));
}

#[test]
fn test_ranking_keeps_order_when_nothing_answers() {
    let mirrors = vec![
        MirrorSource::new("http://127.0.0.1:9/first"),
        MirrorSource::new("http://127.0.0.1:9/second"),
    ];
    let fetcher = ResilientFetcher::new(Duration::from_secs(1), Duration::from_millis(100)).unwrap();
    let ranked = fetcher.rank_mirrors(&mirrors, "v1", "aura.zip");
    assert_eq!(ranked, mirrors);
}

#[test]
fn test_release_catalog_from_api() {
    let body = br#"[
        {"tag_name": "v2.0.0-rc1", "name": "RC", "prerelease": true, "draft": false, "assets": []},
        {"tag_name": "v1.9.0", "name": "[CI] nightly", "prerelease": true, "draft": false, "assets": []},
        {"tag_name": "v1.8.0", "name": "Stable", "prerelease": false, "draft": false,
         "assets": [{"name": "app-patched.asar", "browser_download_url": "https://dl.example/app-patched.asar"}]},
        {"tag_name": "v1.8.1", "name": "Draft", "prerelease": false, "draft": true, "assets": []}
    ]"#;
    let server = MirrorServer::start(
        HashMap::from([("releases".to_string(), body.to_vec())]),
        MirrorMode::Serve,
    );

    let client = ReleaseCatalogClient::new(
        format!("{}/releases", server.base),
        None,
        Duration::from_secs(3),
        5,
    )
    .unwrap();
    let catalog = client.catalog();

    assert_eq!(catalog.data_source, CatalogSource::GithubApi);
    assert_eq!(catalog.latest(ReleaseChannel::Stable).unwrap().tag, "v1.8.0");
    assert_eq!(catalog.latest(ReleaseChannel::Prerelease).unwrap().tag, "v2.0.0-rc1");
    assert_eq!(catalog.latest(ReleaseChannel::Ci).unwrap().tag, "v1.9.0");
    assert!(catalog.find("v1.8.1").is_none());

    client.catalog();
    assert_eq!(server.hits().len(), 1, "second lookup should hit the cache");
}
