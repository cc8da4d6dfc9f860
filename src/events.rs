//! Event bridge — turns host torrent-lifecycle events into notifications
//! for the owning chat.
//!
//! The host's event callbacks run on the engine's own emission thread, not
//! the plugin's dispatch loop. The bridge therefore does only two things in
//! the callback: a mutex-guarded store update, and a non-blocking enqueue
//! onto a channel the dispatch loop drains for actual delivery.

use crate::channel::telegram::escape_markdown;
use crate::engine::TorrentEngine;
use crate::ownership::OwnershipStore;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A torrent lifecycle event as reported by the host daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentEvent {
    Added {
        torrent_id: String,
        /// True when the engine is replaying torrents restored from saved
        /// state at startup; those never notify.
        from_state: bool,
    },
    Removed {
        torrent_id: String,
    },
    Finished {
        torrent_id: String,
    },
}

/// A queued outbound notification, keyed by the owning chat's store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub chat_id: String,
    pub text: String,
}

/// Handle given to the host's event manager. Cheap to clone; safe to call
/// from any thread.
#[derive(Clone)]
pub struct EventBridge {
    ownership: OwnershipStore,
    engine: Arc<dyn TorrentEngine>,
    tx: mpsc::Sender<Notification>,
}

impl EventBridge {
    pub fn new(
        ownership: OwnershipStore,
        engine: Arc<dyn TorrentEngine>,
        tx: mpsc::Sender<Notification>,
    ) -> Self {
        Self {
            ownership,
            engine,
            tx,
        }
    }

    /// Handle one lifecycle event. Never blocks: delivery is queued for the
    /// dispatch loop, and a full queue drops the notification with a log
    /// line rather than stalling the host's event thread.
    pub fn handle(&self, event: TorrentEvent) {
        match event {
            TorrentEvent::Added {
                torrent_id,
                from_state,
            } => {
                self.reconcile();
                if from_state {
                    return;
                }
                self.notify_owner(&torrent_id, "Torrent added");
            }
            TorrentEvent::Removed { .. } => {
                self.reconcile();
            }
            TorrentEvent::Finished { torrent_id } => {
                self.notify_owner(&torrent_id, "Torrent finished");
            }
        }
    }

    fn reconcile(&self) {
        let live = self.engine.live_torrent_ids();
        if let Err(e) = self.ownership.reconcile(&live) {
            // Best-effort: a failed persist must not break notification flow.
            eprintln!("[events] Failed to persist ownership reconcile: {e}");
        }
    }

    fn notify_owner(&self, torrent_id: &str, verb: &str) {
        // An unresolved owner is expected for torrents added outside the
        // bot (e.g. the daemon's own UI), not an error.
        let Some(owner) = self.ownership.owner_of(torrent_id) else {
            return;
        };
        let Some(name) = self.engine.torrent_name(torrent_id) else {
            return;
        };

        let notification = Notification {
            chat_id: owner,
            text: format!("{verb}: *{}*", escape_markdown(&name)),
        };
        if let Err(e) = self.tx.try_send(notification) {
            eprintln!("[events] Dropping notification for {torrent_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::engine::TorrentStatus;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Engine stub with a fixed set of live torrents.
    struct FixedEngine {
        torrents: Mutex<Vec<(String, String)>>,
    }

    impl FixedEngine {
        fn new(torrents: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                torrents: Mutex::new(
                    torrents
                        .iter()
                        .map(|(id, name)| (id.to_string(), name.to_string()))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl TorrentEngine for FixedEngine {
        async fn add_torrent_magnet(&self, _uri: &str) -> Result<String> {
            unimplemented!("not used by bridge tests")
        }

        async fn add_torrent_file(
            &self,
            _file_name: Option<&str>,
            _content: &[u8],
        ) -> Result<String> {
            unimplemented!("not used by bridge tests")
        }

        fn torrent_name(&self, torrent_id: &str) -> Option<String> {
            self.torrents
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| id == torrent_id)
                .map(|(_, name)| name.clone())
        }

        fn live_torrent_ids(&self) -> HashSet<String> {
            self.torrents
                .lock()
                .unwrap()
                .iter()
                .map(|(id, _)| id.clone())
                .collect()
        }

        fn status(&self, _torrent_id: &str) -> Option<TorrentStatus> {
            None
        }
    }

    fn setup(
        engine: Arc<FixedEngine>,
    ) -> (TempDir, OwnershipStore, EventBridge, mpsc::Receiver<Notification>) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(dir.path()).into_shared();
        let ownership = OwnershipStore::new(store);
        let (tx, rx) = mpsc::channel(16);
        let bridge = EventBridge::new(ownership.clone(), engine, tx);
        (dir, ownership, bridge, rx)
    }

    #[test]
    fn added_notifies_owner_with_name() {
        let engine = FixedEngine::new(&[("abc", "ubuntu.iso")]);
        let (_dir, ownership, bridge, mut rx) = setup(engine);
        ownership.record("100", "abc", "ubuntu.iso").unwrap();

        bridge.handle(TorrentEvent::Added {
            torrent_id: "abc".into(),
            from_state: false,
        });

        let n = rx.try_recv().unwrap();
        assert_eq!(n.chat_id, "100");
        assert_eq!(n.text, "Torrent added: *ubuntu.iso*");
    }

    #[test]
    fn added_from_state_reconciles_but_stays_silent() {
        let engine = FixedEngine::new(&[("abc", "ubuntu.iso")]);
        let (_dir, ownership, bridge, mut rx) = setup(engine);
        ownership.record("100", "abc", "ubuntu.iso").unwrap();
        ownership.record("100", "gone", "stale").unwrap();

        bridge.handle(TorrentEvent::Added {
            torrent_id: "abc".into(),
            from_state: true,
        });

        assert!(rx.try_recv().is_err());
        // The stale entry was still pruned.
        assert_eq!(ownership.owner_of("gone"), None);
    }

    #[test]
    fn added_without_owner_is_a_noop() {
        let engine = FixedEngine::new(&[("abc", "ubuntu.iso")]);
        let (_dir, _ownership, bridge, mut rx) = setup(engine);

        bridge.handle(TorrentEvent::Added {
            torrent_id: "abc".into(),
            from_state: false,
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn removed_reconciles_only() {
        let engine = FixedEngine::new(&[("keep", "kept")]);
        let (_dir, ownership, bridge, mut rx) = setup(engine);
        ownership.record("100", "keep", "kept").unwrap();
        ownership.record("100", "gone", "removed one").unwrap();

        bridge.handle(TorrentEvent::Removed {
            torrent_id: "gone".into(),
        });

        assert!(rx.try_recv().is_err());
        assert_eq!(ownership.owner_of("gone"), None);
        assert_eq!(ownership.owner_of("keep").as_deref(), Some("100"));
    }

    #[test]
    fn finished_notifies_owner() {
        let engine = FixedEngine::new(&[("abc", "my_file.iso")]);
        let (_dir, ownership, bridge, mut rx) = setup(engine);
        ownership.record("200", "abc", "my_file.iso").unwrap();

        bridge.handle(TorrentEvent::Finished {
            torrent_id: "abc".into(),
        });

        let n = rx.try_recv().unwrap();
        assert_eq!(n.chat_id, "200");
        assert_eq!(n.text, "Torrent finished: *my\\_file.iso*");
    }

    #[test]
    fn finished_for_unknown_torrent_is_a_noop() {
        let engine = FixedEngine::new(&[]);
        let (_dir, ownership, bridge, mut rx) = setup(engine);
        ownership.record("100", "abc", "x").unwrap();

        // Owner resolves but the engine no longer reports the torrent.
        bridge.handle(TorrentEvent::Finished {
            torrent_id: "abc".into(),
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let engine = FixedEngine::new(&[("abc", "x")]);
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(dir.path()).into_shared();
        let ownership = OwnershipStore::new(store);
        ownership.record("100", "abc", "x").unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let bridge = EventBridge::new(ownership, engine, tx);

        for _ in 0..3 {
            bridge.handle(TorrentEvent::Finished {
                torrent_id: "abc".into(),
            });
        }

        // Exactly one made it; the rest were dropped without blocking.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
