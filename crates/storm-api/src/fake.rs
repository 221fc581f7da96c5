//! In-memory daemon for handler tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use storm_pool::{Connection, Pool, PoolConfig};

use crate::ApiState;
use crate::daemon::*;

const LABEL_PLUGIN: &str = "Label";

#[derive(Default)]
struct Store {
    torrents: BTreeMap<String, TorrentStatus>,
    options: BTreeMap<String, TorrentOptions>,
    paused: BTreeSet<String>,
    removed_with_data: Vec<String>,
    plugins: BTreeSet<String>,
    labels: BTreeSet<String>,
    torrent_labels: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeDaemon {
    store: Arc<Mutex<Store>>,
    dials: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl FakeDaemon {
    pub(crate) const DISK_FREE: i64 = 1 << 40;

    pub(crate) fn with_torrents(ids: &[&str]) -> Self {
        let daemon = Self::default();
        for id in ids {
            daemon.insert_torrent(id);
        }
        daemon
    }

    pub(crate) fn insert_torrent(&self, id: &str) {
        let status = TorrentStatus {
            name: format!("{id}.iso"),
            state: "Seeding".to_string(),
            progress: 100.0,
            ..TorrentStatus::default()
        };
        self.store.lock().unwrap().torrents.insert(id.to_string(), status);
    }

    pub(crate) fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub(crate) fn enable_label_plugin(&self) {
        self.store
            .lock()
            .unwrap()
            .plugins
            .insert(LABEL_PLUGIN.to_string());
    }

    pub(crate) fn label_torrent(&self, id: &str, label: &str) {
        let mut store = self.store.lock().unwrap();
        store.labels.insert(label.to_string());
        store
            .torrent_labels
            .insert(id.to_string(), label.to_string());
    }

    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn torrent_ids(&self) -> Vec<String> {
        self.store.lock().unwrap().torrents.keys().cloned().collect()
    }

    pub(crate) fn paused(&self) -> Vec<String> {
        self.store.lock().unwrap().paused.iter().cloned().collect()
    }

    pub(crate) fn removed_with_data(&self) -> Vec<String> {
        self.store.lock().unwrap().removed_with_data.clone()
    }

    pub(crate) fn options_of(&self, id: &str) -> Option<TorrentOptions> {
        self.store.lock().unwrap().options.get(id).cloned()
    }

    fn session(&self) -> FakeSession {
        FakeSession {
            daemon: self.clone(),
        }
    }
}

/// Single-connection pool over `daemon` with a one second acquire timeout.
pub(crate) fn test_state(daemon: &FakeDaemon) -> ApiState<FakeSession> {
    let daemon = daemon.clone();
    let pool = Pool::new(
        PoolConfig::new(1, Duration::from_secs(30)),
        move || daemon.session(),
    )
    .unwrap();
    ApiState::new(pool, Duration::from_secs(1))
}

pub(crate) struct FakeSession {
    daemon: FakeDaemon,
}

impl FakeSession {
    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.daemon.store.lock().unwrap()
    }

    fn labels_enabled(&self) -> RpcResult<()> {
        if self.store().plugins.contains(LABEL_PLUGIN) {
            Ok(())
        } else {
            Err(RpcError::new("AttributeError", "label plugin is not enabled"))
        }
    }
}

fn not_found(id: &str) -> RpcError {
    RpcError::new("InvalidTorrentError", format!("torrent {id} not found"))
}

fn matches(filter: &TorrentFilter, id: &str, status: &TorrentStatus) -> bool {
    (filter.ids.is_empty() || filter.ids.iter().any(|wanted| wanted == id))
        && filter.state.as_ref().is_none_or(|state| *state == status.state)
}

impl Connection for FakeSession {
    type Error = io::Error;

    async fn connect(&mut self) -> io::Result<()> {
        self.daemon.dials.fetch_add(1, Ordering::SeqCst);
        if self.daemon.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Daemon for FakeSession {
    async fn torrents_status(
        &mut self,
        filter: &TorrentFilter,
    ) -> RpcResult<BTreeMap<String, TorrentStatus>> {
        Ok(self
            .store()
            .torrents
            .iter()
            .filter(|(id, status)| matches(filter, id, status))
            .map(|(id, status)| (id.clone(), status.clone()))
            .collect())
    }

    async fn torrent_status(&mut self, id: &str) -> RpcResult<TorrentStatus> {
        self.store().torrents.get(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn add_torrent(
        &mut self,
        source: &TorrentSource,
        options: &TorrentOptions,
    ) -> RpcResult<String> {
        let id = match source {
            TorrentSource::Url(uri) | TorrentSource::Magnet(uri) => uri.clone(),
            TorrentSource::File { data, .. } if data.is_empty() => return Ok(String::new()),
            TorrentSource::File { filename, .. } => filename.clone(),
        };
        self.daemon.insert_torrent(&id);
        self.store().options.insert(id.clone(), options.clone());
        Ok(id)
    }

    async fn remove_torrents(
        &mut self,
        ids: &[String],
        remove_data: bool,
    ) -> RpcResult<Vec<RemoveFailure>> {
        let mut failures = Vec::new();
        for id in ids {
            if !self.remove_torrent(id, remove_data).await? {
                failures.push(RemoveFailure {
                    id: id.clone(),
                    message: "torrent not found".to_string(),
                });
            }
        }
        Ok(failures)
    }

    async fn remove_torrent(&mut self, id: &str, remove_data: bool) -> RpcResult<bool> {
        let mut store = self.store();
        if store.torrents.remove(id).is_none() {
            return Ok(false);
        }
        if remove_data {
            store.removed_with_data.push(id.to_string());
        }
        Ok(true)
    }

    async fn pause_torrents(&mut self, ids: &[String]) -> RpcResult<()> {
        self.store().paused.extend(ids.iter().cloned());
        Ok(())
    }

    async fn resume_torrents(&mut self, ids: &[String]) -> RpcResult<()> {
        let mut store = self.store();
        for id in ids {
            store.paused.remove(id);
        }
        Ok(())
    }

    async fn set_torrent_options(&mut self, id: &str, options: &TorrentOptions) -> RpcResult<()> {
        let mut store = self.store();
        if !store.torrents.contains_key(id) {
            return Err(not_found(id));
        }
        store.options.insert(id.to_string(), options.clone());
        Ok(())
    }

    async fn session_status(&mut self) -> RpcResult<SessionStatus> {
        Ok(SessionStatus {
            num_peers: self.store().torrents.len() as i64,
            ..SessionStatus::default()
        })
    }

    async fn free_space(&mut self, _path: Option<&str>) -> RpcResult<i64> {
        Ok(FakeDaemon::DISK_FREE)
    }

    async fn enabled_plugins(&mut self) -> RpcResult<Vec<String>> {
        Ok(self.store().plugins.iter().cloned().collect())
    }

    async fn enable_plugin(&mut self, name: &str) -> RpcResult<()> {
        self.store().plugins.insert(name.to_string());
        Ok(())
    }

    async fn disable_plugin(&mut self, name: &str) -> RpcResult<()> {
        self.store().plugins.remove(name);
        Ok(())
    }

    async fn labels(&mut self) -> RpcResult<Vec<String>> {
        self.labels_enabled()?;
        Ok(self.store().labels.iter().cloned().collect())
    }

    async fn add_label(&mut self, label: &str) -> RpcResult<()> {
        self.labels_enabled()?;
        self.store().labels.insert(label.to_string());
        Ok(())
    }

    async fn remove_label(&mut self, label: &str) -> RpcResult<()> {
        self.labels_enabled()?;
        let mut store = self.store();
        store.labels.remove(label);
        store.torrent_labels.retain(|_, l| l != label);
        Ok(())
    }

    async fn torrents_labels(
        &mut self,
        filter: &TorrentFilter,
    ) -> RpcResult<BTreeMap<String, String>> {
        self.labels_enabled()?;
        let store = self.store();
        Ok(store
            .torrent_labels
            .iter()
            .filter(|(id, _)| {
                store
                    .torrents
                    .get(*id)
                    .is_some_and(|status| matches(filter, id, status))
            })
            .map(|(id, label)| (id.clone(), label.clone()))
            .collect())
    }

    async fn set_torrent_label(&mut self, id: &str, label: &str) -> RpcResult<()> {
        self.labels_enabled()?;
        let mut store = self.store();
        if !store.torrents.contains_key(id) {
            return Err(not_found(id));
        }
        store.torrent_labels.insert(id.to_string(), label.to_string());
        Ok(())
    }
}
