mod availability;
mod conflict;
mod error;
mod places;
mod queries;
mod reservations;
mod store;

pub use availability::{check_policy, PolicyViolation};
pub use conflict::{find_conflict, SlotHolder};
pub use error::{EngineError, CONFLICT_MESSAGE};
pub use places::require_admin;
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedPlaceState = Arc<RwLock<PlaceState>>;

// ── Group-commit journal channel ─────────────────────────

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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the journal and batches appends.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One fsync for the whole batch, then answer every sender.
///
/// A non-append command found while draining ends the batch; it runs after
/// the batch is committed so ordering is preserved.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("journal writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        warn!("journal flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// All or nothing: on any failure the journal is cut back to its last synced
/// length, so no event of a failed batch can resurface on replay.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        if let Err(e) = wal.rollback() {
            tracing::error!("journal rollback failed, refusing further appends: {e}");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

// ── Engine ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub wal_path: PathBuf,
    /// Reject reservations outside a place's days, hours, or date window.
    pub enforce_availability: bool,
}

impl EngineConfig {
    pub fn new(wal_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: wal_path.into(),
            enforce_availability: true,
        }
    }
}

/// The reservation core: place registry, reservation service and read paths
/// over one in-memory store backed by the journal.
pub struct Engine {
    pub(super) store: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    pub(super) enforce_availability: bool,
    /// Held by place creation across append+insert, and by compaction for the
    /// whole snapshot+rewrite, so a snapshot never misses a committed event.
    pub(super) catalog_gate: Mutex<()>,
}

impl Engine {
    /// Replay the journal and start its writer. Must run inside a tokio runtime.
    pub fn new(config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&config.wal_path)?;
        let wal = Wal::open(&config.wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            enforce_availability: config.enforce_availability,
            catalog_gate: Mutex::new(()),
        };

        // Sole owner of every lock during replay, so try_write cannot fail;
        // blocking_write would panic inside the runtime.
        for event in &events {
            engine.replay_event(event);
        }
        engine.init_places_gauge();
        info!(
            "replayed {} journal events: {} places",
            events.len(),
            engine.store.place_count()
        );
        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        if let Event::PlaceCreated { place } = event {
            self.store.insert_place(PlaceState::new(place.clone()));
            return;
        }
        if let Event::ReservationUpdated {
            reservation,
            previous_place_id,
        } = event
            && *previous_place_id != reservation.place_id
            && let Some(source) = self.store.get_place(previous_place_id)
            && let Ok(mut guard) = source.try_write()
        {
            self.store.detach_reservation(&mut guard, reservation.id);
        }
        let place_id = event.place_id();
        match self.store.get_place(&place_id) {
            Some(ps) => match ps.try_write() {
                Ok(mut guard) => self.store.apply_event(&mut guard, event),
                Err(_) => warn!("replay: place {place_id} locked, event skipped"),
            },
            None => warn!("replay: event for unknown place {place_id} skipped"),
        }
    }

    /// Write event to the journal via the group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Journal then apply. The caller holds the place's write lock, so the
    /// decision it made is still valid when the event lands.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut PlaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(ps, event);
        Ok(())
    }

    pub(super) fn place_handle(&self, id: Ulid) -> Result<SharedPlaceState, EngineError> {
        self.store.get_place(&id).ok_or(EngineError::PlaceNotFound(id))
    }

    /// Write-lock the place currently holding reservation `id` and, when
    /// `target` names a different place, that one too. Locks are taken in id
    /// order. If the reservation moved while we waited, look it up again.
    pub(super) async fn lock_reservation(
        &self,
        id: Ulid,
        target: Option<Ulid>,
    ) -> Result<ReservationLocks, EngineError> {
        loop {
            let source_id = self
                .store
                .place_of(&id)
                .ok_or(EngineError::BookingNotFound(id))?;
            let source = self.place_handle(source_id)?;
            let (source_guard, target_guard) = match target.filter(|t| *t != source_id) {
                None => (source.write_owned().await, None),
                Some(target_id) => {
                    let dest = self.place_handle(target_id)?;
                    if source_id < target_id {
                        let s = source.write_owned().await;
                        let t = dest.write_owned().await;
                        (s, Some(t))
                    } else {
                        let t = dest.write_owned().await;
                        let s = source.write_owned().await;
                        (s, Some(t))
                    }
                }
            };
            if source_guard.reservation(id).is_some() {
                return Ok(ReservationLocks {
                    source: source_guard,
                    target: target_guard,
                });
            }
            if self.store.place_of(&id) == Some(source_id) {
                return Err(EngineError::BookingNotFound(id));
            }
            debug!("reservation {id} moved while locking, retrying");
        }
    }

    /// Only valid while no request holds a place lock, i.e. right after replay.
    fn init_places_gauge(&self) {
        let active = self
            .store
            .place_handles()
            .iter()
            .filter(|ps| ps.try_read().is_ok_and(|g| !g.place.is_deleted()))
            .count();
        metrics::gauge!(observability::PLACES_ACTIVE).set(active as f64);
    }

    // ── Maintenance ──────────────────────────────────────

    /// Rewrite the journal as the minimal event set that rebuilds the current
    /// state: one `PlaceCreated` per place, then one `ReservationCreated` per
    /// reservation, cancelled ones included.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog_gate.lock().await;
        let mut guards = Vec::new();
        for ps in self.store.place_handles() {
            guards.push(ps.read_owned().await);
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::PlaceCreated {
                place: guard.place.clone(),
            });
            events.extend(guard.reservations.iter().map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Write guards for a reservation's current place and, on a move, its
/// destination.
pub(super) struct ReservationLocks {
    pub source: OwnedRwLockWriteGuard<PlaceState>,
    pub target: Option<OwnedRwLockWriteGuard<PlaceState>>,
}
