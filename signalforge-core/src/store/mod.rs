//! Keyed Signal Store
//!
//! A registry of dynamically typed signals addressed by string keys. This is
//! the surface a host bridge or persistence layer talks to when it cannot
//! hold typed handles: it creates a signal, gets back an opaque key, and
//! reads, writes and watches the signal through that key.
//!
//! Every stored signal is an ordinary [`Signal<SignalValue>`], so computeds
//! and effects can depend on store entries like on any other signal
//! (see [`SignalStore::signal`]).

mod value;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use value::SignalValue;

use crate::error::{Error, Result};
use crate::reactive::{try_batch, Signal, Subscription};

/// Opaque key of a stored signal, formatted `sig_<counter>_<unix nanos>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalKey(String);

impl SignalKey {
    fn generate(counter: u64) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        Self(format!("sig_{counter}_{nanos}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SignalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for SignalKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// String-keyed registry of [`SignalValue`] signals.
///
/// The store is a plain value; create as many as needed. Dropping it
/// destroys the signals nobody else holds a handle to.
#[derive(Default)]
pub struct SignalStore {
    signals: RefCell<IndexMap<SignalKey, Signal<SignalValue>>>,
    counter: Cell<u64>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal and return its key.
    pub fn create(&self, initial: impl Into<SignalValue>) -> SignalKey {
        let counter = self.counter.get() + 1;
        self.counter.set(counter);
        let key = SignalKey::generate(counter);

        let signal = Signal::new(initial.into());
        tracing::trace!(key = %key, node = %signal.id(), "store signal created");
        self.signals.borrow_mut().insert(key.clone(), signal);
        key
    }

    /// Current value of `key`. Tracked when read inside a computed or effect.
    pub fn get(&self, key: impl AsRef<str>) -> Result<SignalValue> {
        self.lookup(key.as_ref())?.try_get()
    }

    pub fn set(&self, key: impl AsRef<str>, value: impl Into<SignalValue>) -> Result<()> {
        self.lookup(key.as_ref())?.try_set(value.into()).map(|_| ())
    }

    pub fn has(&self, key: impl AsRef<str>) -> bool {
        self.signals.borrow().contains_key(key.as_ref())
    }

    /// Remove and destroy the signal under `key`.
    ///
    /// Returns `false` if there was none.
    pub fn delete(&self, key: impl AsRef<str>) -> bool {
        let removed = self.signals.borrow_mut().shift_remove(key.as_ref());
        match removed {
            Some(signal) => {
                signal.destroy();
                true
            }
            None => false,
        }
    }

    /// Number of committed changes to `key`.
    pub fn version(&self, key: impl AsRef<str>) -> Result<u64> {
        self.lookup(key.as_ref())?.try_version()
    }

    /// Apply several writes in one batch. Unknown keys are skipped.
    ///
    /// Returns how many writes found their key.
    pub fn batch_update<K, V>(&self, updates: impl IntoIterator<Item = (K, V)>) -> Result<usize>
    where
        K: AsRef<str>,
        V: Into<SignalValue>,
    {
        try_batch(|| {
            let mut applied = 0;
            for (key, value) in updates {
                match self.signal(key.as_ref()) {
                    Some(signal) => {
                        signal.set(value.into());
                        applied += 1;
                    }
                    None => tracing::debug!(key = key.as_ref(), "batch update skipped unknown key"),
                }
            }
            applied
        })
    }

    pub fn len(&self) -> usize {
        self.signals.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.borrow().is_empty()
    }

    /// Keys in creation order.
    pub fn keys(&self) -> Vec<SignalKey> {
        self.signals.borrow().keys().cloned().collect()
    }

    /// Destroy every signal in the store.
    pub fn clear(&self) {
        let signals = std::mem::take(&mut *self.signals.borrow_mut());
        for signal in signals.values() {
            signal.destroy();
        }
    }

    /// Typed handle to the signal under `key`, for use in computeds and effects.
    pub fn signal(&self, key: impl AsRef<str>) -> Option<Signal<SignalValue>> {
        self.signals.borrow().get(key.as_ref()).cloned()
    }

    /// Listen for committed changes to `key`.
    pub fn subscribe(
        &self,
        key: impl AsRef<str>,
        listener: impl Fn(&SignalValue) + 'static,
    ) -> Result<Subscription> {
        Ok(self.lookup(key.as_ref())?.subscribe(listener))
    }

    fn lookup(&self, key: &str) -> Result<Signal<SignalValue>> {
        self.signal(key)
            .ok_or_else(|| Error::SignalNotFound(key.to_owned()))
    }
}

impl fmt::Debug for SignalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStore")
            .field("len", &self.len())
            .finish()
    }
}
