//! Per-pass shared memory.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Slot = Box<dyn Any + Send + Sync>;

/// Key/value store shared by every action of one trampoline pass.
///
/// Drivers use it to coordinate within a lifecycle pass: the first driver
/// creates a value, the next ones read or update it. Values are typed;
/// reading a key with the wrong type yields `None`.
///
/// Cloning is cheap and shares the same storage.
///
/// # Example
///
/// ```
/// use appid_runtime::trampoline::Memory;
///
/// let memory = Memory::default();
/// memory.update("calls", |n: &mut u32| *n += 1);
/// memory.update("calls", |n: &mut u32| *n += 1);
/// assert_eq!(memory.get::<u32>("calls"), Some(2));
/// ```
#[derive(Clone, Default)]
pub struct Memory {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl Memory {
    /// Stores `value`, returning `true` if it replaced an existing entry.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> bool {
        self.slots.lock().insert(key.into(), Box::new(value)).is_some()
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.slots
            .lock()
            .get(key)
            .and_then(|slot| slot.downcast_ref::<T>())
            .cloned()
    }

    /// Returns whether `key` is present, whatever its type.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove<T: Any>(&self, key: &str) -> Option<T> {
        let mut slots = self.slots.lock();
        if !slots.get(key).is_some_and(|slot| slot.is::<T>()) {
            return None;
        }
        slots
            .remove(key)
            .and_then(|slot| slot.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Mutates the value under `key`, creating it with `Default` first.
    ///
    /// Returns `None` without calling `f` when the key holds another type.
    pub fn update<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R>
    where
        T: Any + Default + Send + Sync,
    {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Box::new(T::default()));
        slot.downcast_mut::<T>().map(f)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let mut keys: Vec<_> = slots.keys().collect();
        keys.sort();
        f.debug_struct("Memory").field("keys", &keys).finish()
    }
}
