use std::collections::HashMap;

use parking_lot::Mutex;
use rapace_protocol::CallId;

/// A side's (client's or server's) call-ID -> call-record table (§4.3).
///
/// Generic over the record type so the server can store `(JoinHandle,
/// StreamQueue)` pairs while the client stores its own `CallState`; the
/// registry itself only ever needs insert/remove/inspect.
pub struct CallRegistry<R> {
    calls: Mutex<HashMap<CallId, R>>,
}

impl<R> Default for CallRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> CallRegistry<R> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a fresh record. Returns `false` (and leaves the existing
    /// record untouched) if `id` is already present — the caller is
    /// expected to answer with `RESPONSE(id, error="id in use")` per §4.4.
    pub fn insert(&self, id: CallId, record: R) -> bool {
        let mut calls = self.calls.lock();
        if calls.contains_key(&id) {
            return false;
        }
        calls.insert(id, record);
        true
    }

    /// Remove and return a call's record. This is the single arbiter for
    /// the cancel-vs-result race (§9.1): whichever side calls `remove`
    /// first "wins"; the loser finds nothing and treats it as a no-op.
    pub fn remove(&self, id: CallId) -> Option<R> {
        self.calls.lock().remove(&id)
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.calls.lock().contains_key(&id)
    }

    /// Run `f` against the record for `id`, if it's still registered.
    pub fn with<T>(&self, id: CallId, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        let mut calls = self.calls.lock();
        calls.get_mut(&id).map(f)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every record out of the registry, e.g. for mass cancellation
    /// on transport teardown (§5, P7).
    pub fn drain(&self) -> Vec<(CallId, R)> {
        self.calls.lock().drain().collect()
    }
}

/// Monotonic, wrap-around call-ID allocator (§3, P6).
///
/// `0` is reserved by the protocol and never handed out even if it falls
/// inside `[min, max]`.
pub struct CallIdAllocator {
    min: CallId,
    max: CallId,
    next: Mutex<CallId>,
}

impl CallIdAllocator {
    pub fn new(min: CallId, max: CallId) -> Self {
        assert!(min >= 1, "call id 0 is reserved");
        assert!(min <= max, "empty call id range");
        Self {
            min,
            max,
            next: Mutex::new(min),
        }
    }

    /// Allocate the next free id, skipping any for which `in_use` returns
    /// true. Returns `None` if the entire range is currently in use.
    pub fn allocate(&self, in_use: impl Fn(CallId) -> bool) -> Option<CallId> {
        let mut next = self.next.lock();
        let span = self.max - self.min + 1;
        for _ in 0..span {
            let candidate = *next;
            *next = if candidate == self.max {
                self.min
            } else {
                candidate + 1
            };
            if !in_use(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
