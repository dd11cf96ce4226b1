// Session store - one ephemeral negotiation per identity
//
// Every session incarnation gets a generation number from a store-wide
// counter. Work started against one generation (catalog build, acquisition)
// must present it again when it finishes; if the slot has since been
// cancelled or replaced, the result is stale and the store refuses it.
//
// The lock is held only for the synchronous map update, never across
// extraction or download I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

use super::errors::EngineError;
use super::models::{Catalog, Category};

/// Opaque user/conversation key supplied by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub i64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Where the user is in the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationState {
    Browsing,
    CategoryFiltered { category: Category, page: usize },
    Detail { category: Category, format_id: String },
    CombinePickVideo { page: usize },
    /// Video half is in `Session::pending_video_pick`
    CombinePickAudio { page: usize },
    /// Acquisition in flight
    Resolved,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub catalog: Catalog,
    pub state: NavigationState,
    pub pending_video_pick: Option<String>,
    generation: u64,
}

impl Session {
    pub(crate) fn new(catalog: Catalog, generation: u64) -> Self {
        Self {
            catalog,
            state: NavigationState::Browsing,
            pending_video_pick: None,
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Back to the category menu, keeping the catalog
    pub fn reset(&mut self) {
        self.state = NavigationState::Browsing;
        self.pending_video_pick = None;
    }
}

enum Slot {
    /// Catalog build in flight
    Building(u64),
    Active(Session),
}

impl Slot {
    fn generation(&self) -> u64 {
        match self {
            Slot::Building(generation) => *generation,
            Slot::Active(session) => session.generation,
        }
    }
}

/// How a finished acquisition leaves the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Delivered; the session is destroyed
    Delivered,
    /// Failed; the user may pick another target
    Failed,
}

#[derive(Default)]
struct StoreInner {
    slots: HashMap<Identity, Slot>,
    next_generation: u64,
}

/// Keyed session map with explicit create, lookup and delete
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<StoreInner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new incarnation for `identity`, replacing whatever was there.
    /// Returns the generation the catalog build must present to `install`.
    pub async fn begin(&self, identity: Identity) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.next_generation += 1;
        let generation = inner.next_generation;
        if inner.slots.insert(identity, Slot::Building(generation)).is_some() {
            debug!(%identity, generation, "previous session replaced");
        }
        generation
    }

    /// Turn a pending slot into a browsing session. Fails when the slot was
    /// cancelled or replaced while the catalog was being built.
    pub async fn install(
        &self,
        identity: Identity,
        generation: u64,
        catalog: Catalog,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let pending = matches!(
            inner.slots.get(&identity),
            Some(Slot::Building(current)) if *current == generation
        );
        if !pending {
            return Err(EngineError::SessionExpired);
        }
        inner
            .slots
            .insert(identity, Slot::Active(Session::new(catalog, generation)));
        Ok(())
    }

    /// Drop a pending slot after a failed build, if it is still ours
    pub async fn abandon(&self, identity: Identity, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.slots.get(&identity).map(Slot::generation) == Some(generation) {
            inner.slots.remove(&identity);
        }
    }

    /// Run `f` against the active session. Never creates one.
    pub async fn with_session<R, F>(&self, identity: Identity, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut inner = self.inner.lock().await;
        match inner.slots.get_mut(&identity) {
            Some(Slot::Active(session)) => Ok(f(session)),
            _ => Err(EngineError::SessionExpired),
        }
    }

    /// Record the end of an acquisition. Returns false when the session it
    /// belonged to is gone, in which case the result must be discarded.
    pub async fn complete(&self, identity: Identity, generation: u64, completion: Completion) -> bool {
        let mut inner = self.inner.lock().await;
        let current = matches!(
            inner.slots.get(&identity),
            Some(Slot::Active(session)) if session.generation == generation
        );
        if !current {
            return false;
        }
        match completion {
            Completion::Delivered => {
                inner.slots.remove(&identity);
            }
            Completion::Failed => {
                if let Some(Slot::Active(session)) = inner.slots.get_mut(&identity) {
                    session.reset();
                }
            }
        }
        true
    }

    /// Destroy the session immediately. In-flight work is not interrupted;
    /// it is discarded when it reports back.
    pub async fn cancel(&self, identity: Identity) -> bool {
        self.inner.lock().await.slots.remove(&identity).is_some()
    }

    pub async fn contains(&self, identity: Identity) -> bool {
        matches!(
            self.inner.lock().await.slots.get(&identity),
            Some(Slot::Active(_))
        )
    }

    /// Active and pending sessions
    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
