//! Pending two-party requests (duel challenges).
//!
//! A request is keyed by its target. It stays Pending until the target accepts
//! or declines it, or until a timer expires it. Every transition removes the
//! request under the registry lock, so a request is resolved exactly once.

use crate::Error;
use parlor_types::{casino::DUEL_TIMEOUT_SECS, AccountId, ChatId};
use std::{
    collections::HashMap,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info};

/// Where the request was announced, so the front end can edit it later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    pub chat: ChatId,
    pub message: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Unique per registry; distinguishes requests reusing the same target.
    pub id: u64,
    pub challenger: AccountId,
    pub target: AccountId,
    pub stake: i64,
    pub created: Instant,
    pub handle: Option<Handle>,
}

enum Slot {
    Pending(Request),
    /// Left behind by the expiry timer until the target responds or the slot
    /// is reused.
    Expired { at: Instant },
}

#[derive(Default)]
struct Inner {
    slots: HashMap<AccountId, Slot>,
    next_id: u64,
}

/// Registry of pending requests.
///
/// Cheap to clone; clones share the same state. Creating a request spawns its
/// expiry timer, so it must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Requests {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
    expired: Option<mpsc::UnboundedSender<Request>>,
}

impl Default for Requests {
    fn default() -> Self {
        Self::new(Duration::from_secs(DUEL_TIMEOUT_SECS))
    }
}

impl Requests {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            timeout,
            expired: None,
        }
    }

    /// Also deliver every expired request on the returned channel.
    pub fn with_expiry_notifications(mut self) -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.expired = Some(sender);
        (self, receiver)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(
        &self,
        challenger: AccountId,
        target: AccountId,
        stake: i64,
        handle: Option<Handle>,
    ) -> Result<Request, Error> {
        if challenger == target {
            return Err(Error::SelfTarget(challenger));
        }

        let mut inner = self.inner();
        let lapsed = self.sweep(&mut inner);
        let created = self.insert(&mut inner, challenger, target, stake, handle);
        drop(inner);
        for request in lapsed {
            self.notify(request);
        }

        let request = created?;
        self.spawn_expiry(target, request.id);
        info!(id = request.id, challenger, target, stake, "request created");
        Ok(request)
    }

    /// Turn every request past its deadline into a tombstone, whether or not
    /// its timer has run, and return them.
    fn sweep(&self, inner: &mut Inner) -> Vec<Request> {
        let mut lapsed = Vec::new();
        for slot in inner.slots.values_mut() {
            let at = match slot {
                Slot::Pending(request) if self.is_stale(request) => {
                    request.created + self.timeout
                }
                _ => continue,
            };
            if let Slot::Pending(request) = mem::replace(slot, Slot::Expired { at }) {
                lapsed.push(request);
            }
        }
        lapsed
    }

    fn insert(
        &self,
        inner: &mut Inner,
        challenger: AccountId,
        target: AccountId,
        stake: i64,
        handle: Option<Handle>,
    ) -> Result<Request, Error> {
        let now = Instant::now();
        for slot in inner.slots.values() {
            if let Slot::Pending(request) = slot {
                if request.challenger == challenger {
                    return Err(Error::RequestPending(challenger));
                }
            }
        }
        if let Some(Slot::Pending(_)) = inner.slots.get(&target) {
            return Err(Error::RequestPending(target));
        }

        // Drop tombstones nobody came back for.
        let horizon = self.timeout;
        inner.slots.retain(|_, slot| match slot {
            Slot::Pending(_) => true,
            Slot::Expired { at } => now.saturating_duration_since(*at) < horizon,
        });

        inner.next_id += 1;
        let request = Request {
            id: inner.next_id,
            challenger,
            target,
            stake,
            created: now,
            handle,
        };
        inner.slots.insert(target, Slot::Pending(request.clone()));
        Ok(request)
    }

    fn spawn_expiry(&self, target: AccountId, id: u64) {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(registry.timeout).await;
            registry.expire(target, id);
        });
    }

    /// Expire `id` if it still occupies `target`'s slot.
    fn expire(&self, target: AccountId, id: u64) {
        let mut inner = self.inner();
        let Some(Slot::Pending(request)) = inner.slots.get(&target) else {
            return;
        };
        if request.id != id {
            return;
        }
        let Some(Slot::Pending(request)) = inner.slots.insert(
            target,
            Slot::Expired {
                at: Instant::now(),
            },
        ) else {
            return;
        };
        drop(inner);
        self.notify(request);
    }

    fn notify(&self, request: Request) {
        debug!(id = request.id, target = request.target, "request expired");
        if let Some(expired) = &self.expired {
            let _ = expired.send(request);
        }
    }

    /// The pending request addressed to `target`.
    pub fn get(&self, target: AccountId) -> Option<Request> {
        match self.inner().slots.get(&target) {
            Some(Slot::Pending(request)) if !self.is_stale(request) => Some(request.clone()),
            _ => None,
        }
    }

    /// The pending request sent by `challenger`.
    pub fn outgoing(&self, challenger: AccountId) -> Option<Request> {
        self.inner().slots.values().find_map(|slot| match slot {
            Slot::Pending(request)
                if request.challenger == challenger && !self.is_stale(request) =>
            {
                Some(request.clone())
            }
            _ => None,
        })
    }

    pub fn attach_handle(&self, target: AccountId, handle: Handle) -> Result<(), Error> {
        match self.inner().slots.get_mut(&target) {
            Some(Slot::Pending(request)) => {
                request.handle = Some(handle);
                Ok(())
            }
            Some(Slot::Expired { .. }) => Err(Error::RequestExpired(target)),
            None => Err(Error::RequestNotFound(target)),
        }
    }

    fn is_stale(&self, request: &Request) -> bool {
        Instant::now() >= request.created + self.timeout
    }

    /// Remove the request addressed to `target` on behalf of `resolver`.
    fn resolve(&self, target: AccountId, resolver: AccountId) -> Result<Request, Error> {
        if resolver != target {
            return Err(Error::RequestNotYours { target, resolver });
        }
        let slot = self.inner().slots.remove(&target);
        match slot {
            // The timer may not have run yet; the deadline still applies.
            Some(Slot::Pending(request)) if self.is_stale(&request) => {
                self.notify(request);
                Err(Error::RequestExpired(target))
            }
            Some(Slot::Pending(request)) => Ok(request),
            Some(Slot::Expired { .. }) => Err(Error::RequestExpired(target)),
            None => Err(Error::RequestNotFound(target)),
        }
    }

    /// Take the request for resolution. The caller settles it.
    pub fn accept(&self, target: AccountId, resolver: AccountId) -> Result<Request, Error> {
        let request = self.resolve(target, resolver)?;
        debug!(id = request.id, target, "request accepted");
        Ok(request)
    }

    pub fn decline(&self, target: AccountId, resolver: AccountId) -> Result<Request, Error> {
        let request = self.resolve(target, resolver)?;
        debug!(id = request.id, target, "request declined");
        Ok(request)
    }

    /// Number of pending (not expired) requests.
    pub fn len(&self) -> usize {
        self.inner()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
