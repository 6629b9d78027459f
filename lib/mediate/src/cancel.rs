//! Registry of in-flight exchanges, keyed by request id.
//!
//! Copies of a request share its id, so several exchanges may be registered
//! under one id at once; the entry lives until the last of them finishes.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::RequestId;

#[derive(Debug)]
struct Slot {
    token: CancellationToken,
    exchanges: usize,
}

/// Shared set of requests currently being exchanged.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight {
    slots: Arc<Mutex<HashMap<RequestId, Slot>>>,
}

impl InFlight {
    fn slots(&self) -> MutexGuard<'_, HashMap<RequestId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an exchange for `id` until the returned guard is dropped.
    pub(crate) fn register(&self, id: RequestId, token: &CancellationToken) -> InFlightGuard {
        match self.slots().entry(id) {
            Entry::Occupied(mut occupied) => occupied.get_mut().exchanges += 1,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    token: token.clone(),
                    exchanges: 1,
                });
            }
        }
        InFlightGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Trip the signal of `id` if it is in flight. Returns whether it was.
    pub(crate) fn cancel(&self, id: RequestId) -> bool {
        let token = self.slots().get(&id).map(|slot| slot.token.clone());
        token.is_some_and(|token| {
            token.cancel();
            true
        })
    }

    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.slots().contains_key(&id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots().len()
    }

    fn release(&self, id: RequestId) {
        let mut slots = self.slots();
        if let Entry::Occupied(mut occupied) = slots.entry(id) {
            occupied.get_mut().exchanges -= 1;
            if occupied.get().exchanges == 0 {
                occupied.remove();
            }
        }
    }
}

/// Keeps an exchange registered while alive.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    registry: InFlight,
    id: RequestId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Request};

    fn request() -> Request {
        Request::builder(Method::GET, url::Url::parse("https://example.com").expect("url")).build()
    }

    #[test]
    fn guard_unregisters_on_drop() {
        let registry = InFlight::default();
        let request = request();

        let guard = registry.register(request.id(), request.cancellation());
        assert!(registry.contains(request.id()));

        drop(guard);
        assert!(!registry.contains(request.id()));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn cancel_trips_registered_signal() {
        let registry = InFlight::default();
        let request = request();
        let _guard = registry.register(request.id(), request.cancellation());

        assert!(registry.cancel(request.id()));
        assert!(request.cancellation().is_cancelled());
    }

    #[test]
    fn cancel_of_unknown_request_is_noop() {
        let registry = InFlight::default();
        let request = request();

        assert!(!registry.cancel(request.id()));
        assert!(!request.cancellation().is_cancelled());
    }

    #[test]
    fn copies_share_one_entry_until_last_finishes() {
        let registry = InFlight::default();
        let request = request();
        let copy = request.try_clone().expect("empty body clones");

        let first = registry.register(request.id(), request.cancellation());
        let second = registry.register(copy.id(), copy.cancellation());
        assert_eq!(registry.len(), 1);

        drop(first);
        assert!(registry.contains(request.id()));

        drop(second);
        assert!(!registry.contains(request.id()));
    }
}
