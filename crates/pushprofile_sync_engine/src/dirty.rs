//! Current/dirty snapshot pairs and their persistence.
//!
//! Every entity is held as two layers: `current`, the last state the server
//! confirmed, and `dirty`, the same snapshot with local edits applied. The
//! Dirty Delta is never stored; it is derived by diffing the two layers.
//!
//! Layers are immutable `Arc`s swapped under a write lock, so a reader
//! always sees either the whole old layer or the whole new one. Each write
//! reaches the backend before the in-memory swap.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use pushprofile_protocol::{Delta, Installation, InternalData, User};
use pushprofile_storage::PersistenceBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// The entities tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The person-level profile.
    User,
    /// The current device's installation.
    Installation,
    /// Process-local bookkeeping.
    Internal,
}

impl EntityKind {
    /// Storage key of the current layer.
    pub fn current_key(&self) -> &'static str {
        match self {
            EntityKind::User => "user.current",
            EntityKind::Installation => "installation.current",
            EntityKind::Internal => "internal.current",
        }
    }

    /// Storage key of the dirty layer.
    pub fn dirty_key(&self) -> &'static str {
        match self {
            EntityKind::User => "user.dirty",
            EntityKind::Installation => "installation.dirty",
            EntityKind::Internal => "internal.dirty",
        }
    }
}

/// A snapshot type the store can hold.
pub trait Snapshot:
    Serialize + DeserializeOwned + Clone + Default + PartialEq + Send + Sync + 'static
{
    /// Which entity this snapshot describes.
    const KIND: EntityKind;

    /// Top-level JSON fields that never take part in the delta.
    const LOCAL_ONLY_FIELDS: &'static [&'static str];
}

impl Snapshot for User {
    const KIND: EntityKind = EntityKind::User;
    const LOCAL_ONLY_FIELDS: &'static [&'static str] = User::LOCAL_ONLY_FIELDS;
}

impl Snapshot for Installation {
    const KIND: EntityKind = EntityKind::Installation;
    const LOCAL_ONLY_FIELDS: &'static [&'static str] = Installation::LOCAL_ONLY_FIELDS;
}

impl Snapshot for InternalData {
    const KIND: EntityKind = EntityKind::Internal;
    const LOCAL_ONLY_FIELDS: &'static [&'static str] = &[];
}

pub(crate) fn encode<T: Serialize>(value: &T) -> SyncResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SyncResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
}

struct Layers<T> {
    current: Arc<T>,
    dirty: Arc<T>,
}

/// The current/dirty pair of one entity.
pub struct Slot<T: Snapshot> {
    backend: Arc<dyn PersistenceBackend>,
    layers: RwLock<Layers<T>>,
}

impl<T: Snapshot> Slot<T> {
    /// Loads both layers; a missing dirty layer starts as a copy of current.
    pub fn load(backend: Arc<dyn PersistenceBackend>) -> SyncResult<Self> {
        let current: T = match backend.load(T::KIND.current_key())? {
            Some(bytes) => decode(&bytes)?,
            None => T::default(),
        };
        let current = Arc::new(current);
        let dirty = match backend.load(T::KIND.dirty_key())? {
            Some(bytes) => Arc::new(decode(&bytes)?),
            None => Arc::clone(&current),
        };

        Ok(Self {
            backend,
            layers: RwLock::new(Layers { current, dirty }),
        })
    }

    /// Last server-confirmed snapshot.
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.layers.read().current)
    }

    /// Snapshot with local edits applied.
    pub fn dirty(&self) -> Arc<T> {
        Arc::clone(&self.layers.read().dirty)
    }

    /// Replaces the dirty layer.
    pub fn archive_dirty(&self, value: T) -> SyncResult<()> {
        let mut layers = self.layers.write();
        self.persist_dirty(&value)?;
        layers.dirty = Arc::new(value);
        Ok(())
    }

    /// Edits the dirty layer in place and persists it.
    pub fn modify_dirty<R>(&self, edit: impl FnOnce(&mut T) -> R) -> SyncResult<R> {
        let mut layers = self.layers.write();
        let mut next = (*layers.dirty).clone();
        let out = edit(&mut next);
        self.persist_dirty(&next)?;
        layers.dirty = Arc::new(next);
        Ok(out)
    }

    /// Replaces the current layer, leaving the dirty layer alone.
    pub fn archive_current(&self, value: T) -> SyncResult<()> {
        let mut layers = self.layers.write();
        self.persist_current(&value)?;
        layers.current = Arc::new(value);
        Ok(())
    }

    /// Replaces both layers with `value`, discarding local edits.
    pub fn archive_all(&self, value: T) -> SyncResult<()> {
        let mut layers = self.layers.write();
        self.persist_current(&value)?;
        self.persist_dirty(&value)?;
        let value = Arc::new(value);
        layers.current = Arc::clone(&value);
        layers.dirty = value;
        Ok(())
    }

    /// Applies the same edit to both layers.
    ///
    /// Used for server-maintained fields, which must not show up as a delta.
    pub fn modify_all(&self, edit: impl Fn(&mut T)) -> SyncResult<()> {
        let mut layers = self.layers.write();
        let mut current = (*layers.current).clone();
        let mut dirty = (*layers.dirty).clone();
        edit(&mut current);
        edit(&mut dirty);
        self.persist_current(&current)?;
        self.persist_dirty(&dirty)?;
        layers.current = Arc::new(current);
        layers.dirty = Arc::new(dirty);
        Ok(())
    }

    /// Field-level difference between dirty and current.
    pub fn delta(&self) -> SyncResult<Delta> {
        let (current, dirty) = self.layers();
        Ok(Delta::between(&*current, &*dirty, T::LOCAL_ONLY_FIELDS)?)
    }

    /// Returns true if there are unsynced edits.
    pub fn is_changed(&self) -> bool {
        self.delta().map(|delta| !delta.is_empty()).unwrap_or(true)
    }

    /// Copies dirty into current, emptying the delta.
    pub fn promote(&self) -> SyncResult<()> {
        let mut layers = self.layers.write();
        self.persist_current(&layers.dirty)?;
        layers.current = Arc::clone(&layers.dirty);
        debug!(entity = ?T::KIND, "promoted dirty layer");
        Ok(())
    }

    /// Records that `sent` was accepted by the server.
    ///
    /// Edits made after `sent` was taken stay in the delta.
    pub fn commit(&self, sent: T) -> SyncResult<()> {
        let mut layers = self.layers.write();
        self.persist_current(&sent)?;
        layers.current = Arc::new(sent);
        debug!(entity = ?T::KIND, "committed sent snapshot");
        Ok(())
    }

    /// Adopts `remote` as current and replays the pending delta on top of it.
    ///
    /// Returns the new dirty layer.
    pub fn rebase(&self, remote: T) -> SyncResult<Arc<T>> {
        let mut layers = self.layers.write();
        let pending = Delta::between(&*layers.current, &*layers.dirty, T::LOCAL_ONLY_FIELDS)?;
        let dirty = pending.apply_to(&remote)?;

        self.persist_current(&remote)?;
        self.persist_dirty(&dirty)?;
        layers.current = Arc::new(remote);
        layers.dirty = Arc::new(dirty);
        debug!(entity = ?T::KIND, pending = pending.len(), "rebased onto remote snapshot");
        Ok(Arc::clone(&layers.dirty))
    }

    /// Resets both layers to the default snapshot.
    pub fn reset(&self) -> SyncResult<()> {
        self.archive_all(T::default())
    }

    /// Current and dirty layers read under one lock.
    pub fn layers(&self) -> (Arc<T>, Arc<T>) {
        let layers = self.layers.read();
        (Arc::clone(&layers.current), Arc::clone(&layers.dirty))
    }

    fn persist_current(&self, value: &T) -> SyncResult<()> {
        self.backend.archive(T::KIND.current_key(), &encode(value)?)?;
        Ok(())
    }

    fn persist_dirty(&self, value: &T) -> SyncResult<()> {
        self.backend.archive(T::KIND.dirty_key(), &encode(value)?)?;
        Ok(())
    }
}

/// Current/dirty pairs for every tracked entity.
pub struct DirtyStateStore {
    user: Slot<User>,
    installation: Slot<Installation>,
    internal: Slot<InternalData>,
}

impl DirtyStateStore {
    /// Opens the store, restoring whatever the backend holds.
    pub fn open(backend: Arc<dyn PersistenceBackend>) -> SyncResult<Self> {
        Ok(Self {
            user: Slot::load(Arc::clone(&backend))?,
            installation: Slot::load(Arc::clone(&backend))?,
            internal: Slot::load(backend)?,
        })
    }

    /// The user pair.
    pub fn user(&self) -> &Slot<User> {
        &self.user
    }

    /// The current installation pair.
    pub fn installation(&self) -> &Slot<Installation> {
        &self.installation
    }

    /// The bookkeeping pair.
    pub fn internal(&self) -> &Slot<InternalData> {
        &self.internal
    }

    /// Returns true if the user or the installation has unsynced edits.
    pub fn is_changed(&self) -> bool {
        self.user.is_changed() || self.installation.is_changed()
    }

    /// The current device's push registration id, if it has one.
    pub fn push_registration_id(&self) -> Option<String> {
        self.installation.current().push_registration_id.clone()
    }
}
