// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use aura_install::archive;
use aura_install::compression;
use aura_install::config::Settings;
use aura_install::system::SystemOps;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Response, Server};

/// Serializes tests that run a pipeline; only one session may be active per process.
static PIPELINE_TESTS: Mutex<()> = Mutex::new(());

pub fn serial() -> MutexGuard<'static, ()> {
    PIPELINE_TESTS.lock().unwrap_or_else(|e| e.into_inner())
}

/// How a [`MirrorServer`] answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Serve known files, 404 for everything else
    Serve,
    /// Answer every request with HTTP 500
    Fail,
}

/// In-process HTTP mirror that records every request path
pub struct MirrorServer {
    pub base: String,
    hits: Arc<Mutex<Vec<String>>>,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl MirrorServer {
    /// Serve `files` (keyed by `tag/name`) under `http://127.0.0.1:<port>/dl`
    pub fn start(files: HashMap<String, Vec<u8>>, mode: MirrorMode) -> Self {
        Self::start_with_delay(files, mode, Duration::ZERO)
    }

    /// Like [`MirrorServer::start`], sleeping before each answer
    pub fn start_with_delay(
        files: HashMap<String, Vec<u8>>,
        mode: MirrorMode,
        delay: Duration,
    ) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = server.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let path = request.url().split('?').next().unwrap_or("").to_string();
                    hits.lock().unwrap().push(format!("{} {}", request.method(), path));
                    thread::sleep(delay);

                    let key = path.trim_start_matches("/dl/");
                    let response = match (mode, files.get(key)) {
                        (MirrorMode::Serve, Some(body)) => Response::from_data(body.clone()),
                        (MirrorMode::Serve, None) => {
                            Response::from_data(b"not found".to_vec()).with_status_code(404)
                        }
                        (MirrorMode::Fail, _) => {
                            Response::from_data(b"boom".to_vec()).with_status_code(500)
                        }
                    };
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            base: format!("http://127.0.0.1:{port}/dl"),
            hits,
            server,
            handle: Some(handle),
        }
    }

    /// Request lines seen so far, e.g. `GET /dl/v1/aura.zip`
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

impl Drop for MirrorServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Records calls instead of killing processes or touching drivers
#[derive(Default)]
pub struct FakeSystem {
    pub calls: Mutex<Vec<String>>,
}

impl SystemOps for FakeSystem {
    fn kill_process(&self, image_name: &str) -> aura_install::Result<bool> {
        self.calls.lock().unwrap().push(format!("kill {image_name}"));
        Ok(false)
    }

    fn unload_filter(&self, filter_name: &str) -> aura_install::Result<()> {
        self.calls.lock().unwrap().push(format!("unload {filter_name}"));
        Ok(())
    }
}

/// Settings rooted in `root` with fast timings and no real target glob
pub fn test_settings(root: &Path, mirrors: Vec<String>) -> Settings {
    let mut settings = Settings::default();
    settings.paths.temp_dir = root.join("tmp");
    settings.paths.data_dir = root.join("data");
    settings.paths.backup_dir = root.join("backups");
    settings.paths.state_file = root.join("state/version.json");
    settings.paths.lock_file = root.join("state/install.lock");
    settings.target.target_glob = root.join("nowhere/*").display().to_string();
    settings.download.mirrors = mirrors;
    settings.download.timeout_secs = 5;
    settings.download.probe_timeout_ms = 500;
    settings.install.kill_interval_ms = 10;
    settings.install.kill_settle_ms = 0;
    settings.install.delete_retry_attempts = 2;
    settings.install.delete_retry_delay_ms = 1;
    settings
}

/// Write `files` into a fresh tree and encode it as a container at `dest`
pub fn build_container(dest: &Path, files: &[(&str, &[u8])]) {
    let tree = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = tree.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    archive::encode(tree.path(), dest).unwrap();
}

/// Payload zip holding an `aura/` overlay folder with a `core` subfolder
pub fn build_payload(dest: &Path) {
    let staging = tempfile::tempdir().unwrap();
    let aura = staging.path().join("aura");
    fs::create_dir_all(aura.join("core")).unwrap();
    fs::write(aura.join("index.js"), b"module.exports = 'aura';").unwrap();
    fs::write(aura.join("core/hook.js"), b"// hook").unwrap();
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    compression::pack_zip(staging.path(), &[Path::new("aura")], None, dest).unwrap();
}

/// A patched container and payload pair as a release would ship them
pub fn release_files(dir: &Path) -> (PathBuf, PathBuf) {
    let container = dir.join("app-patched.asar");
    let payload = dir.join("aura.zip");
    build_container(
        &container,
        &[
            ("main.js", b"require('./app');\n"),
            ("package.json", br#"{"name":"assistant","main":"main.js"}"#),
        ],
    );
    build_payload(&payload);
    (container, payload)
}

/// Installed target application with a stock container
pub fn target_install(root: &Path) -> PathBuf {
    let resources = root.join("SeewoService_1.5.2/resources");
    fs::create_dir_all(&resources).unwrap();
    fs::write(resources.join("app.asar"), b"stock container").unwrap();
    resources
}
