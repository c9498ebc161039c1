//! # Bus manager
//!
//! Owns the channels and the dictionary cache, and feeds frames from a
//! trace file or a live adapter into the channels.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::adapter::{open_adapter, FrameSource};
use crate::channel::{Channel, Routed};
use crate::eds::ObjectDictionary;
use crate::error::{ConfigError, TraceError};
use crate::node::store::ObjectSlot;
use crate::node::NodeProtocol;
use crate::trace::{TraceFormat, TraceReader};
use crate::types::BusFrame;

/// How long a live read waits before the bus counts as silent.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Dictionaries loaded so far, one per file path.
#[derive(Debug, Default)]
pub struct DictionaryCache {
    loaded: HashMap<PathBuf, Arc<ObjectDictionary>>,
}

impl DictionaryCache {
    /// Cached dictionary of `path`, loading it on first use or with `reload`.
    pub fn get_or_load(&mut self, path: &Path, reload: bool) -> Result<Arc<ObjectDictionary>, ConfigError> {
        if !reload {
            if let Some(dictionary) = self.loaded.get(path) {
                debug!("Dictionary {} already loaded", path.display());
                return Ok(Arc::clone(dictionary));
            }
        }
        let dictionary = Arc::new(ObjectDictionary::load(path)?);
        self.loaded.insert(path.to_path_buf(), Arc::clone(&dictionary));
        Ok(dictionary)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<ObjectDictionary>> {
        self.loaded.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Frame counts of one replay or capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames: usize,
    pub stored: usize,
    pub skipped: usize,
}

impl ReplayStats {
    fn count(&mut self, routed: &Routed) {
        self.frames += 1;
        if routed.stored() {
            self.stored += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct BusManager {
    channels: BTreeMap<u32, Channel>,
    dictionaries: DictionaryCache,
}

impl BusManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, id: u32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn channel_mut(&mut self, id: u32) -> &mut Channel {
        self.channels.entry(id).or_insert_with(|| Channel::new(id))
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.keys().copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn dictionaries(&self) -> &DictionaryCache {
        &self.dictionaries
    }

    /// Attaches the dictionary in `path` to `channel`/`node`, creating both
    /// as needed. Files are loaded once and shared.
    pub fn configure_node(
        &mut self,
        channel: u32,
        node: u8,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ObjectDictionary>, ConfigError> {
        self.configure(channel, node, path.as_ref(), false)
    }

    /// Like [`configure_node`](Self::configure_node) but reloads the file
    /// and reseeds the node's values from it.
    pub fn reconfigure_node(
        &mut self,
        channel: u32,
        node: u8,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ObjectDictionary>, ConfigError> {
        self.configure(channel, node, path.as_ref(), true)
    }

    fn configure(&mut self, channel: u32, node: u8, path: &Path, reload: bool) -> Result<Arc<ObjectDictionary>, ConfigError> {
        let dictionary = self.dictionaries.get_or_load(path, reload).map_err(|e| {
            error!("Channel {} node {}: {}", channel, node, e);
            e
        })?;
        self.attach(channel, node, Arc::clone(&dictionary), reload);
        Ok(dictionary)
    }

    /// Attaches an already loaded dictionary.
    pub fn attach(&mut self, channel: u32, node: u8, dictionary: Arc<ObjectDictionary>, reseed: bool) {
        self.channel_mut(channel)
            .node_entry(node)
            .attach_dictionary(dictionary, reseed);
    }

    pub fn route(&mut self, frame: &BusFrame) -> Routed {
        self.channel_mut(frame.channel)
            .route_frame(frame.timestamp, frame.cob_id, &frame.data)
    }

    /// Replays a trace file. Every frame goes to its own channel, or to
    /// `channel` when given. Malformed lines are logged and skipped.
    pub fn replay_trace_file(&mut self, path: impl AsRef<Path>, channel: Option<u32>) -> Result<ReplayStats, TraceError> {
        let path = path.as_ref();
        let reader = TraceReader::open(path)?;
        info!("Replaying {} ({:?})", path.display(), reader.format());
        Ok(self.replay(reader, channel))
    }

    /// Replays trace text from any reader.
    pub fn replay_trace<R: BufRead>(&mut self, reader: R, format: TraceFormat, channel: Option<u32>) -> ReplayStats {
        self.replay(TraceReader::new(reader, format), channel)
    }

    fn replay<R: BufRead>(&mut self, reader: TraceReader<R>, channel: Option<u32>) -> ReplayStats {
        let mut stats = ReplayStats::default();
        for record in reader {
            match record {
                Ok(mut frame) => {
                    if let Some(channel) = channel {
                        frame.channel = channel;
                    }
                    let routed = self.route(&frame);
                    stats.count(&routed);
                }
                Err(e) => {
                    warn!("{}", e);
                    stats.skipped += 1;
                }
            }
        }
        info!(
            "Replay done: {} frames, {} stored, {} lines skipped",
            stats.frames, stats.stored, stats.skipped
        );
        stats
    }

    /// Captures from a live adapter into `channel` until `frame_limit`
    /// frames (0 for no limit) or until the bus goes silent. Adapter
    /// failures are logged, never returned.
    pub fn stream_live_bus(
        &mut self,
        channel: u32,
        adapter: &str,
        bus: &str,
        bitrate: u32,
        frame_limit: usize,
    ) -> ReplayStats {
        match open_adapter(adapter, bus, bitrate) {
            Ok(mut source) => self.stream_from(source.as_mut(), channel, frame_limit),
            Err(e) => {
                error!("{} {}: {}", adapter, bus, e);
                ReplayStats::default()
            }
        }
    }

    /// Pulls frames from `source` into `channel`.
    pub fn stream_from(&mut self, source: &mut dyn FrameSource, channel: u32, frame_limit: usize) -> ReplayStats {
        let mut stats = ReplayStats::default();
        while frame_limit == 0 || stats.frames < frame_limit {
            match source.next_frame(POLL_INTERVAL) {
                Ok(Some(mut frame)) => {
                    frame.channel = channel;
                    let routed = self.route(&frame);
                    stats.count(&routed);
                }
                Ok(None) => {
                    info!("Channel {}: no data, stopping", channel);
                    break;
                }
                Err(e) => {
                    error!("Channel {}: {}", channel, e);
                    break;
                }
            }
        }
        stats
    }

    pub fn node(&self, channel: u32, node: u8) -> Option<&NodeProtocol> {
        let Some(found) = self.channels.get(&channel) else {
            warn!("Channel {} unknown", channel);
            return None;
        };
        let node_protocol = found.node(node);
        if node_protocol.is_none() {
            warn!("Channel {}: node {} unknown", channel, node);
        }
        node_protocol
    }

    /// Last value and history of `index:sub` on one node.
    pub fn lookup(&self, channel: u32, node: u8, index: u16, sub: u8) -> Option<&ObjectSlot> {
        self.node(channel, node)?.lookup(index, sub)
    }
}
