use std::collections::HashSet;

use slotmap::{Key, SlotMap};

/// Direction in which a recorded delta is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Restores the state before the delta (undo).
    Backward,
    /// Re-applies the delta (redo).
    Forward,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    index: u32,
    value: Option<T>,
}

#[derive(Debug)]
struct Journal<K, T> {
    touched: HashSet<K>,
    before: Vec<(K, Option<T>)>,
    next_index: u32,
}

/// Before/after state of one entity.
#[derive(Debug, Clone)]
struct Change<K, T> {
    key: K,
    before: Option<T>,
    after: Option<T>,
}

/// Net effect of a committed transaction on one arena.
#[derive(Debug, Clone)]
pub struct ArenaDelta<K, T> {
    changes: Vec<Change<K, T>>,
    next_index: (u32, u32),
}

impl<K, T> ArenaDelta<K, T> {
    /// Returns `true` if the transaction changed nothing in this arena.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.next_index.0 == self.next_index.1
    }

    /// Number of entities whose state differs across the delta.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Arena of entities of one kind, named `{prefix}{index:04}`.
///
/// Slots are never freed: a destroyed entity leaves a tombstone so its key
/// and name stay valid for undo. While a transaction is open each entity is
/// snapshotted on its first write.
#[derive(Debug)]
pub struct Arena<K: Key, T> {
    prefix: &'static str,
    slots: SlotMap<K, Slot<T>>,
    next_index: u32,
    journal: Option<Journal<K, T>>,
}

impl<K: Key, T: Clone + PartialEq> Arena<K, T> {
    /// Creates an empty arena whose entities are named with `prefix`.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            slots: SlotMap::with_key(),
            next_index: 0,
            journal: None,
        }
    }

    /// Name prefix of this arena.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Inserts an entity, giving it the next free name.
    pub fn insert(&mut self, value: T) -> K {
        let index = self.next_index;
        self.next_index += 1;
        let key = self.slots.insert(Slot {
            index,
            value: Some(value),
        });
        if let Some(journal) = &mut self.journal {
            journal.touched.insert(key);
            journal.before.push((key, None));
        }
        key
    }

    /// Returns the entity if it is alive.
    #[must_use]
    pub fn get(&self, key: K) -> Option<&T> {
        self.slots.get(key).and_then(|slot| slot.value.as_ref())
    }

    /// Returns the entity for mutation, snapshotting it first if a
    /// transaction is open.
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot = self.slots.get_mut(key)?;
        slot.value.as_ref()?;
        if let Some(journal) = &mut self.journal {
            if journal.touched.insert(key) {
                journal.before.push((key, slot.value.clone()));
            }
        }
        slot.value.as_mut()
    }

    /// Destroys the entity, keeping its slot as a tombstone.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key)?;
        slot.value.as_ref()?;
        if let Some(journal) = &mut self.journal {
            if journal.touched.insert(key) {
                journal.before.push((key, slot.value.clone()));
            }
        }
        slot.value.take()
    }

    /// Returns `true` if the key refers to a live entity.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the live entities.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots
            .iter()
            .filter_map(|(key, slot)| slot.value.as_ref().map(|v| (key, v)))
    }

    /// Keys of the live entities.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Session name of a key. Destroyed entities keep their name.
    #[must_use]
    pub fn name(&self, key: K) -> String {
        match self.slots.get(key) {
            Some(slot) => format!("{}{:04}", self.prefix, slot.index),
            None => format!("{}????", self.prefix),
        }
    }

    /// Looks up a live entity by its session name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<K> {
        let index: u32 = name.strip_prefix(self.prefix)?.parse().ok()?;
        self.slots
            .iter()
            .find(|(_, slot)| slot.index == index && slot.value.is_some())
            .map(|(key, _)| key)
    }

    /// Opens a transaction. Opening one twice keeps the first.
    pub fn begin(&mut self) {
        if self.journal.is_none() {
            self.journal = Some(Journal {
                touched: HashSet::new(),
                before: Vec::new(),
                next_index: self.next_index,
            });
        }
    }

    /// Closes the transaction and returns its net effect.
    pub fn commit(&mut self) -> ArenaDelta<K, T> {
        let Some(journal) = self.journal.take() else {
            return ArenaDelta {
                changes: Vec::new(),
                next_index: (self.next_index, self.next_index),
            };
        };
        let changes = journal
            .before
            .into_iter()
            .filter_map(|(key, before)| {
                let after = self.slots.get(key).and_then(|slot| slot.value.clone());
                (before != after).then_some(Change { key, before, after })
            })
            .collect();
        ArenaDelta {
            changes,
            next_index: (journal.next_index, self.next_index),
        }
    }

    /// Closes the transaction and restores every touched entity.
    ///
    /// Names allocated by the failed transaction are released.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (key, before) in journal.before.into_iter().rev() {
            if before.is_none() {
                self.slots.remove(key);
            } else if let Some(slot) = self.slots.get_mut(key) {
                slot.value = before;
            }
        }
        self.next_index = journal.next_index;
    }

    /// Replays a committed delta.
    ///
    /// When going backward with `rewind_names`, the names allocated by
    /// the delta become free again.
    pub fn apply(&mut self, delta: &ArenaDelta<K, T>, direction: Direction, rewind_names: bool) {
        match direction {
            Direction::Backward => {
                for change in delta.changes.iter().rev() {
                    if let Some(slot) = self.slots.get_mut(change.key) {
                        slot.value.clone_from(&change.before);
                    }
                }
                if rewind_names {
                    self.next_index = delta.next_index.0;
                }
            }
            Direction::Forward => {
                for change in &delta.changes {
                    if let Some(slot) = self.slots.get_mut(change.key) {
                        slot.value.clone_from(&change.after);
                    }
                }
                self.next_index = self.next_index.max(delta.next_index.1);
            }
        }
    }
}
