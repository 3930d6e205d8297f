//! Keyed collections.
//!
//! Items are matched across renders by key. Items without a key fall back
//! to their position (`_$auto{index}`), which is reported once per runtime.
//! Items are laid out one after another starting where the old collection
//! began; views already in place are left untouched.

use std::fmt;

use crate::collections::map::{HashMap, HashSet};
use crate::controller::ControllerId;
use crate::error::ReconcileError;
use crate::reconciler::{anchor, first_view, place, Reconciler, Slot};
use crate::runtime::Warning;
use crate::value::Value;
use crate::view::{Placeholder, ViewId, ViewTree};
use crate::vnode::{Live, VNode};

/// Identity of a collection item. Keys compare by their text, so `1` and
/// `"1"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    /// Positional fallback for an item without a key.
    pub fn auto(index: usize) -> Self {
        Key(format!("_$auto{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_value(value: &Value) -> Self {
        Key(value.to_string())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Key(text.to_owned())
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Key(text)
    }
}

impl From<i64> for Key {
    fn from(number: i64) -> Self {
        Key(number.to_string())
    }
}

/// Live state of a realized collection.
#[derive(Debug, Default)]
pub struct CollectionState {
    /// Present exactly while the collection is empty.
    pub(crate) placeholder: Option<ViewId>,
    pub(crate) keys: HashMap<Key, usize>,
}

impl CollectionState {
    pub fn placeholder(&self) -> Option<ViewId> {
        self.placeholder
    }

    pub fn index_of(&self, key: &Key) -> Option<usize> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<T: ViewTree> Reconciler<T> {
    /// Resolve every item's key, failing on the first duplicate before
    /// anything is touched.
    fn resolve_keys(&self, items: &[Option<VNode>]) -> Result<Vec<Key>, ReconcileError> {
        let mut seen: HashSet<Key> = HashSet::default();
        let mut keys = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = match item.as_ref().and_then(VNode::key) {
                Some(key) => key,
                None => {
                    self.runtime_handle().warn_once(Warning::UndefinedKey);
                    Key::auto(index)
                }
            };
            if !seen.insert(key.clone()) {
                return Err(ReconcileError::DuplicateKey { key });
            }
            keys.push(key);
        }
        Ok(keys)
    }

    pub(crate) fn realize_collection(
        &mut self,
        owner: Option<ControllerId>,
        node: &mut VNode,
    ) -> Result<(), ReconcileError> {
        let keys = self.resolve_keys(&node.children)?;
        for item in node.children.iter_mut().flatten() {
            self.realize(owner, item)?;
        }
        let placeholder = if node.children.is_empty() {
            Some(self.views.create(Box::new(Placeholder)))
        } else {
            None
        };
        node.live = Some(Live::Collection(CollectionState {
            placeholder,
            keys: index_keys(keys),
        }));
        Ok(())
    }

    pub(crate) fn diff_collection(
        &mut self,
        owner: Option<ControllerId>,
        old: VNode,
        new: &mut VNode,
    ) -> Result<ViewId, ReconcileError> {
        let keys = self.resolve_keys(&new.children)?;
        let mut slot = self.leading_slot(&old)?;
        let VNode {
            children: mut previous,
            live,
            ..
        } = old;
        let mut state = match live {
            Some(Live::Collection(state)) => state,
            _ => CollectionState::default(),
        };
        let mut by_key = std::mem::take(&mut state.keys);

        for (key, entry) in keys.iter().zip(new.children.iter_mut()) {
            let Some(item) = entry.as_mut() else {
                continue;
            };
            let matched = by_key
                .remove(key)
                .and_then(|index| previous.get_mut(index).and_then(Option::take))
                .filter(|old_item| !self.is_released(old_item));
            match matched {
                Some(old_item) if old_item.fingerprint != item.fingerprint => {
                    let after = anchor(&self.controllers, &old_item)?;
                    self.diff(owner, old_item, item, after)?;
                }
                Some(old_item) => *item = old_item,
                None => self.realize(owner, item)?,
            }
            slot = Slot::After(place(&mut self.views, &self.controllers, item, slot)?);
        }

        if new.children.is_empty() {
            let holder = match state.placeholder {
                Some(holder) => holder,
                None => self.views.create(Box::new(Placeholder)),
            };
            slot.fill(&mut self.views, holder)?;
            state.placeholder = Some(holder);
        } else if let Some(holder) = state.placeholder.take() {
            self.views.remove(holder)?;
        }

        for leftover in previous.into_iter().flatten() {
            self.remove_live(owner, leftover)?;
        }

        state.keys = index_keys(keys);
        new.live = Some(Live::Collection(state));
        anchor(&self.controllers, new)
    }

    /// Slot directly in front of the first live view of `node`. A detached
    /// collection falls back to the slot after its last view.
    fn leading_slot(&self, node: &VNode) -> Result<Slot, ReconcileError> {
        let first = first_view(&self.controllers, node)?;
        Ok(match self.views.parent(first) {
            Some(parent) => match self.views.previous_sibling(first) {
                Some(prev) => Slot::After(prev),
                None => Slot::First(parent),
            },
            None => Slot::After(anchor(&self.controllers, node)?),
        })
    }
}

fn index_keys(keys: Vec<Key>) -> HashMap<Key, usize> {
    keys.into_iter()
        .enumerate()
        .map(|(index, key)| (key, index))
        .collect()
}
