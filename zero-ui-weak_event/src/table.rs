use std::{collections::HashMap, fmt, mem};

use slotmap::SlotMap;

use crate::{Liveness, LivenessKey, WeakHandler};

slotmap::new_key_type! {
    /// Identifies one subscription in a [`WeakSubscriptionTable`].
    pub struct SubscriptionKey;
}

struct Record<A: ?Sized> {
    subscriber: Liveness,
    handler: WeakHandler<A>,
}
impl<A: ?Sized> Record<A> {
    fn is_active(&self) -> bool {
        self.subscriber.is_alive() && self.handler.is_alive()
    }
}

/// Subscriptions grouped by handler target.
///
/// Most targets only ever subscribe one handler, the slot is only promoted to a list when a
/// second handler for the same target is added and demoted back when it is removed.
enum TargetSlot {
    Single(SubscriptionKey),
    Many(Vec<SubscriptionKey>),
}
impl TargetSlot {
    fn keys(&self) -> &[SubscriptionKey] {
        match self {
            TargetSlot::Single(k) => std::slice::from_ref(k),
            TargetSlot::Many(ks) => ks,
        }
    }

    fn push(&mut self, key: SubscriptionKey) {
        match self {
            TargetSlot::Single(k) => *self = TargetSlot::Many(vec![*k, key]),
            TargetSlot::Many(ks) => ks.push(key),
        }
    }

    /// Remove `key`, returns `true` if the slot is now empty.
    fn remove(&mut self, key: SubscriptionKey) -> bool {
        match self {
            TargetSlot::Single(k) => *k == key,
            TargetSlot::Many(ks) => {
                ks.retain(|k| *k != key);
                match ks.len() {
                    0 => true,
                    1 => {
                        *self = TargetSlot::Single(ks[0]);
                        false
                    }
                    _ => false,
                }
            }
        }
    }
}

/// Arena of weak subscriptions.
///
/// Each subscription pairs a subscriber identity with a [`WeakHandler`], neither is kept alive by the table.
/// A subscription is *active* while both are alive, inactive subscriptions are never returned by
/// [`snapshot`] and are removed by [`purge`].
///
/// Subscriptions are kept in subscription order, a side table indexes them by handler target.
///
/// [`snapshot`]: Self::snapshot
/// [`purge`]: Self::purge
pub struct WeakSubscriptionTable<A: ?Sized> {
    records: SlotMap<SubscriptionKey, Record<A>>,
    order: Vec<SubscriptionKey>,
    targets: HashMap<LivenessKey, TargetSlot>,
}
impl<A: ?Sized> Default for WeakSubscriptionTable<A> {
    fn default() -> Self {
        Self::new()
    }
}
impl<A: ?Sized> WeakSubscriptionTable<A> {
    /// New empty table.
    pub fn new() -> Self {
        WeakSubscriptionTable {
            records: SlotMap::with_key(),
            order: vec![],
            targets: HashMap::new(),
        }
    }

    /// Add a subscription.
    ///
    /// The same handler can be subscribed more than once, each subscription is called.
    pub fn subscribe(&mut self, subscriber: Liveness, handler: WeakHandler<A>) -> SubscriptionKey {
        let target = handler.target_key();
        let key = self.records.insert(Record { subscriber, handler });
        self.order.push(key);
        match self.targets.get_mut(&target) {
            Some(slot) => slot.push(key),
            None => {
                self.targets.insert(target, TargetSlot::Single(key));
            }
        }
        key
    }

    /// Remove the first subscription of `handler`.
    ///
    /// Returns `false` if the handler was not subscribed, unsubscribing twice is not an error.
    pub fn unsubscribe(&mut self, handler: &WeakHandler<A>) -> bool {
        let key = self.targets.get(&handler.target_key()).and_then(|slot| {
            slot.keys()
                .iter()
                .copied()
                .find(|k| self.records.get(*k).map(|r| r.handler.ptr_eq(handler)).unwrap_or(false))
        });
        match key {
            Some(k) => self.remove(k).is_some(),
            None => false,
        }
    }

    /// Remove the subscription, returns the handler if it was subscribed.
    pub fn remove(&mut self, key: SubscriptionKey) -> Option<WeakHandler<A>> {
        let record = self.records.remove(key)?;
        self.order.retain(|k| *k != key);
        self.untrack_target(record.handler.target_key(), key);
        Some(record.handler)
    }

    fn untrack_target(&mut self, target: LivenessKey, key: SubscriptionKey) {
        if let Some(slot) = self.targets.get_mut(&target) {
            if slot.remove(key) {
                self.targets.remove(&target);
            }
        }
    }

    /// If the subscription exists and both subscriber and handler target are alive.
    pub fn is_active(&self, key: SubscriptionKey) -> bool {
        self.records.get(key).map(Record::is_active).unwrap_or(false)
    }

    /// Get the subscription handler, even if it is inactive.
    pub fn get(&self, key: SubscriptionKey) -> Option<&WeakHandler<A>> {
        self.records.get(key).map(|r| &r.handler)
    }

    /// Get the subscription subscriber.
    pub fn subscriber(&self, key: SubscriptionKey) -> Option<&Liveness> {
        self.records.get(key).map(|r| &r.subscriber)
    }

    /// Active handlers bound to the target identified by `target`, in subscription order.
    pub fn handlers_for(&self, target: LivenessKey) -> Vec<WeakHandler<A>> {
        match self.targets.get(&target) {
            Some(slot) => slot
                .keys()
                .iter()
                .filter_map(|k| self.records.get(*k))
                .filter(|r| r.is_active())
                .map(|r| r.handler.clone())
                .collect(),
            None => vec![],
        }
    }

    /// Clone of all active subscriptions in subscription order.
    ///
    /// The second value is `true` if any inactive subscription was skipped.
    pub fn snapshot(&self) -> (Vec<(SubscriptionKey, WeakHandler<A>)>, bool) {
        let mut has_dead = false;
        let mut r = Vec::with_capacity(self.order.len());
        for key in &self.order {
            let record = &self.records[*key];
            if record.is_active() {
                r.push((*key, record.handler.clone()));
            } else {
                has_dead = true;
            }
        }
        (r, has_dead)
    }

    /// Remove all inactive subscriptions, returns how many were removed.
    pub fn purge(&mut self) -> usize {
        let order = mem::take(&mut self.order);
        let mut removed = 0;
        for key in order {
            if self.records[key].is_active() {
                self.order.push(key);
            } else if let Some(record) = self.records.remove(key) {
                self.untrack_target(record.handler.target_key(), key);
                removed += 1;
            }
        }
        removed
    }

    /// Number of subscriptions, including inactive ones not purged yet.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// If the table has no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
impl<A: ?Sized> fmt::Debug for WeakSubscriptionTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSubscriptionTable")
            .field("len", &self.records.len())
            .field("targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}
