mod error;
mod mutations;
mod queries;
mod schedule;
mod store;

pub use error::{EngineError, Entity};
pub use queries::BookingScope;
pub use schedule::{bucket_matches, has_finished_booking, last_booking, next_booking, BookingBucket};

use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::model::*;
use crate::wal::Wal;

use store::EntityStore;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task owning the WAL file. Group commit: the first append
/// pulls in everything else already queued behind it, and a single fsync
/// covers the whole batch. Control commands (compaction, the append
/// counter) run between batches, never inside one.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut deferred = None;
        match cmd {
            WalCommand::Append { event, response } => {
                let mut waiters = vec![response];
                let mut buffer_err = wal.buffer(&event).err();
                while deferred.is_none() {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            if buffer_err.is_none() {
                                buffer_err = wal.buffer(&event).err();
                            }
                            waiters.push(response);
                        }
                        Ok(other) => deferred = Some(other),
                        Err(_) => break, // nothing else queued
                    }
                }
                commit_batch(&mut wal, waiters, buffer_err);
            }
            other => deferred = Some(other),
        }
        if let Some(cmd) = deferred {
            run_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(
    wal: &mut Wal,
    waiters: Vec<oneshot::Sender<io::Result<()>>>,
    buffer_err: Option<io::Error>,
) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(waiters.len() as f64);
    let started = std::time::Instant::now();
    // Commit even when buffering failed part-way, so stray buffered bytes
    // cannot bleed into a later batch that will report success.
    let commit_err = wal.commit().err();
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    let failure = buffer_err.or(commit_err);
    if let Some(ref e) = failure {
        tracing::error!("WAL commit failed, {} writers notified: {e}", waiters.len());
    }
    for tx in waiters {
        let _ = tx.send(match &failure {
            None => Ok(()),
            Some(e) => Err(io::Error::new(e.kind(), e.to_string())),
        });
    }
}

fn run_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compacted(wal.path(), &events).and_then(|()| wal.install_compacted());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched above"),
    }
}

/// The booking engine. Owns all entity state and the WAL writer channel.
/// All invariant checks happen before the single WAL append of an
/// operation; the in-memory apply follows a successful append, so a failed
/// operation leaves no trace.
pub struct Engine {
    pub(crate) store: EntityStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Open the WAL at `wal_path`, rebuild state from it, and start the
    /// group-commit writer task. Must be called within a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: EntityStore::new(),
            wal_tx,
        };

        // Replay is single-owner: try_read/try_write on the row Arcs always
        // succeed instantly (no contention). Never use blocking_write here
        // because this may run inside an async context.
        for event in &events {
            match event {
                Event::UserUpdated { id, .. } => {
                    if let Some(user) = engine.store.get_user(id) {
                        let mut guard = user.try_write().expect("replay: uncontended write");
                        engine.store.apply_user_event(&mut guard, event);
                    }
                }
                Event::ItemUpdated { id, .. } => {
                    if let Some(item) = engine.store.get_item(id) {
                        let mut guard = item.try_write().expect("replay: uncontended write");
                        engine.store.apply_item_event(&mut guard, event);
                    }
                }
                Event::BookingDecided { id, .. } => {
                    if let Some(booking) = engine.store.get_booking(id) {
                        let mut guard = booking.try_write().expect("replay: uncontended write");
                        engine.store.apply_booking_event(&mut guard, event);
                    }
                }
                Event::UserDeleted { id } => {
                    let email = engine.store.get_user(id).map(|user| {
                        user.try_read().expect("replay: uncontended read").email.clone()
                    });
                    if let Some(email) = email {
                        engine.store.remove_user(id, &email);
                    }
                }
                other => engine.store.apply(other),
            }
        }
        if !events.is_empty() {
            tracing::info!("replayed {} events from {}", events.len(), wal_path.display());
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then insert. Creation events apply at the map level, so
    /// no row lock is involved.
    pub(super) async fn persist_insert(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply(event);
        Ok(())
    }
}
