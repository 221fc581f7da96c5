//! Remote operations of the torrent daemon.
//!
//! A [`Daemon`] is a pooled [`Connection`] that can also answer the RPC
//! calls the HTTP surface needs. The wire protocol lives with the
//! implementor; this crate only sees typed requests and replies.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use storm_pool::Connection;

/// Error raised by the daemon itself, as opposed to transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{exception_type}: {exception_message}")]
pub struct RpcError {
    pub exception_type: String,
    pub exception_message: String,
    pub traceback: String,
}

impl RpcError {
    pub fn new(exception_type: impl Into<String>, exception_message: impl Into<String>) -> Self {
        Self {
            exception_type: exception_type.into(),
            exception_message: exception_message.into(),
            traceback: String::new(),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Selects torrents by id and state. An empty `ids` list means all torrents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorrentFilter {
    pub ids: Vec<String>,
    pub state: Option<String>,
}

/// Status fields reported for a single torrent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentStatus {
    pub name: String,
    pub state: String,
    pub progress: f32,
    pub total_size: i64,
    pub total_done: i64,
    pub download_payload_rate: i64,
    pub upload_payload_rate: i64,
    pub eta: f64,
    pub num_seeds: i64,
    pub num_peers: i64,
    pub ratio: f32,
    pub save_path: String,
    pub time_added: f64,
}

/// Daemon-wide transfer counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub download_rate: f32,
    pub upload_rate: f32,
    pub payload_download_rate: f32,
    pub payload_upload_rate: f32,
    pub total_download: i64,
    pub total_upload: i64,
    pub num_peers: i64,
    pub dht_nodes: i64,
    pub has_incoming_connections: bool,
}

/// Per-torrent options. Unset fields are left untouched by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_slots: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_download_speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritize_first_last_pieces: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_managed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_at_ratio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_ratio: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_at_ratio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_completed_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_location: Option<String>,
}

/// Where a new torrent comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    Url(String),
    Magnet(String),
    /// A `.torrent` file: its name and base64-encoded contents.
    File { filename: String, data: String },
}

/// A torrent the daemon refused to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFailure {
    pub id: String,
    pub message: String,
}

/// RPC session with the torrent daemon.
///
/// Every method takes `&mut self`: a session is used by one request at a
/// time and is handed back to the pool afterwards.
pub trait Daemon: Connection {
    fn torrents_status(
        &mut self,
        filter: &TorrentFilter,
    ) -> impl Future<Output = RpcResult<BTreeMap<String, TorrentStatus>>> + Send;

    fn torrent_status(
        &mut self,
        id: &str,
    ) -> impl Future<Output = RpcResult<TorrentStatus>> + Send;

    /// Returns the new torrent's id, or an empty string when the daemon
    /// could not read the torrent.
    fn add_torrent(
        &mut self,
        source: &TorrentSource,
        options: &TorrentOptions,
    ) -> impl Future<Output = RpcResult<String>> + Send;

    fn remove_torrents(
        &mut self,
        ids: &[String],
        remove_data: bool,
    ) -> impl Future<Output = RpcResult<Vec<RemoveFailure>>> + Send;

    /// Returns `false` when the daemon did not remove the torrent.
    fn remove_torrent(
        &mut self,
        id: &str,
        remove_data: bool,
    ) -> impl Future<Output = RpcResult<bool>> + Send;

    fn pause_torrents(&mut self, ids: &[String]) -> impl Future<Output = RpcResult<()>> + Send;

    fn resume_torrents(&mut self, ids: &[String]) -> impl Future<Output = RpcResult<()>> + Send;

    fn set_torrent_options(
        &mut self,
        id: &str,
        options: &TorrentOptions,
    ) -> impl Future<Output = RpcResult<()>> + Send;

    fn session_status(&mut self) -> impl Future<Output = RpcResult<SessionStatus>> + Send;

    /// Free bytes at `path`, or at the default download location.
    fn free_space(&mut self, path: Option<&str>) -> impl Future<Output = RpcResult<i64>> + Send;

    fn enabled_plugins(&mut self) -> impl Future<Output = RpcResult<Vec<String>>> + Send;

    fn enable_plugin(&mut self, name: &str) -> impl Future<Output = RpcResult<()>> + Send;

    fn disable_plugin(&mut self, name: &str) -> impl Future<Output = RpcResult<()>> + Send;

    // Label plugin. These fail when the plugin is not enabled.

    fn labels(&mut self) -> impl Future<Output = RpcResult<Vec<String>>> + Send;

    fn add_label(&mut self, label: &str) -> impl Future<Output = RpcResult<()>> + Send;

    fn remove_label(&mut self, label: &str) -> impl Future<Output = RpcResult<()>> + Send;

    fn torrents_labels(
        &mut self,
        filter: &TorrentFilter,
    ) -> impl Future<Output = RpcResult<BTreeMap<String, String>>> + Send;

    fn set_torrent_label(
        &mut self,
        id: &str,
        label: &str,
    ) -> impl Future<Output = RpcResult<()>> + Send;
}
