use std::any::Any;

use slotmap::{new_key_type, SlotMap};

use crate::error::ReconcileError;
use crate::Properties;

new_key_type! {
    /// Handle to a live view. Handles of removed views never alias a newer
    /// view that reuses the same storage.
    pub struct ViewId;
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A node of the live (retained) tree.
pub trait View: AsAny {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Extra detail shown next to the type name in tree dumps.
    fn label(&self) -> Option<String> {
        None
    }
}

/// Invisible marker view that holds a position in the tree.
#[derive(Debug, Default)]
pub struct Placeholder;

impl View for Placeholder {}

/// Leaf view showing a single string.
#[derive(Debug, Default, Properties)]
pub struct TextView {
    #[prop]
    pub value: String,
}

impl View for TextView {
    fn label(&self) -> Option<String> {
        Some(format!("{:?}", self.value))
    }
}

/// The mutable live tree the reconciler drives.
///
/// `get_mut` is the only path through which properties are written, so
/// implementations may treat it as a property update.
pub trait ViewTree {
    fn create(&mut self, view: Box<dyn View>) -> ViewId;
    fn get_mut(&mut self, id: ViewId) -> Result<&mut dyn View, ReconcileError>;
    fn append_to(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError>;
    /// Move `id` so it directly follows `prev` under `prev`'s parent.
    fn after_to(&mut self, id: ViewId, prev: ViewId) -> Result<(), ReconcileError>;
    fn prepend_to(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError>;
    /// Detach `id` and drop it together with its descendants.
    fn remove(&mut self, id: ViewId) -> Result<(), ReconcileError>;
    fn parent(&self, id: ViewId) -> Option<ViewId>;
    fn children(&self, id: ViewId) -> Vec<ViewId>;

    fn next_sibling(&self, id: ViewId) -> Option<ViewId> {
        let siblings = self.children(self.parent(id)?);
        let index = siblings.iter().position(|child| *child == id)?;
        siblings.get(index + 1).copied()
    }

    fn previous_sibling(&self, id: ViewId) -> Option<ViewId> {
        let siblings = self.children(self.parent(id)?);
        let index = siblings.iter().position(|child| *child == id)?;
        index.checked_sub(1).map(|index| siblings[index])
    }

    fn dump(&self) -> String {
        String::new()
    }
}

struct ViewEntry {
    view: Box<dyn View>,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
}

/// Arena backed [`ViewTree`]. Storage of removed views is reused.
#[derive(Default)]
pub struct MemoryViewTree {
    entries: SlotMap<ViewId, ViewEntry>,
}

impl MemoryViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live views.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of views the arena can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn view<V: View>(&self, id: ViewId) -> Option<&V> {
        (*self.entry(id).ok()?.view).as_any().downcast_ref::<V>()
    }

    pub fn with_view<V: View, R>(
        &mut self,
        id: ViewId,
        f: impl FnOnce(&mut V) -> R,
    ) -> Result<R, ReconcileError> {
        let entry = self.entry_mut(id)?;
        let view = (*entry.view)
            .as_any_mut()
            .downcast_mut::<V>()
            .ok_or(ReconcileError::MissingView { id })?;
        Ok(f(view))
    }

    /// Text of every [`TextView`] below `root`, depth first.
    pub fn texts(&self, root: ViewId) -> Vec<String> {
        let mut texts = Vec::new();
        self.collect_texts(root, &mut texts);
        texts
    }

    fn collect_texts(&self, id: ViewId, texts: &mut Vec<String>) {
        if let Some(text) = self.view::<TextView>(id) {
            texts.push(text.value.clone());
        }
        for child in self.children(id) {
            self.collect_texts(child, texts);
        }
    }

    pub fn dump_tree(&self, root: Option<ViewId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.dump_view(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }

    fn dump_view(&self, output: &mut String, id: ViewId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.entry(id) {
            Ok(entry) => {
                let type_name = entry.view.type_name();
                let short = type_name.rsplit("::").next().unwrap_or(type_name);
                match entry.view.label() {
                    Some(label) => output.push_str(&format!("{indent}[{id:?}] {short} {label}\n")),
                    None => output.push_str(&format!("{indent}[{id:?}] {short}\n")),
                }
                for child in &entry.children {
                    self.dump_view(output, *child, depth + 1);
                }
            }
            Err(_) => output.push_str(&format!("{indent}[{id:?}] (missing)\n")),
        }
    }

    fn entry(&self, id: ViewId) -> Result<&ViewEntry, ReconcileError> {
        self.entries.get(id).ok_or(ReconcileError::MissingView { id })
    }

    fn entry_mut(&mut self, id: ViewId) -> Result<&mut ViewEntry, ReconcileError> {
        self.entries.get_mut(id).ok_or(ReconcileError::MissingView { id })
    }

    fn detach(&mut self, id: ViewId) -> Result<(), ReconcileError> {
        if let Some(parent) = self.entry_mut(id)?.parent.take() {
            let siblings = &mut self.entry_mut(parent)?.children;
            siblings.retain(|child| *child != id);
        }
        Ok(())
    }

    fn release(&mut self, id: ViewId) {
        if let Some(entry) = self.entries.remove(id) {
            for child in entry.children {
                self.release(child);
            }
        }
    }
}

impl ViewTree for MemoryViewTree {
    fn create(&mut self, view: Box<dyn View>) -> ViewId {
        self.entries.insert(ViewEntry {
            view,
            parent: None,
            children: Vec::new(),
        })
    }

    fn get_mut(&mut self, id: ViewId) -> Result<&mut dyn View, ReconcileError> {
        Ok(&mut *self.entry_mut(id)?.view)
    }

    fn append_to(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError> {
        self.entry(parent)?;
        self.detach(id)?;
        self.entry_mut(parent)?.children.push(id);
        self.entry_mut(id)?.parent = Some(parent);
        Ok(())
    }

    fn after_to(&mut self, id: ViewId, prev: ViewId) -> Result<(), ReconcileError> {
        if id == prev {
            return Ok(());
        }
        let parent = self.entry(prev)?.parent;
        self.detach(id)?;
        // A detached `prev` has no siblings to follow, so `id` stays detached.
        if let Some(parent) = parent {
            let siblings = &mut self.entry_mut(parent)?.children;
            let index = siblings
                .iter()
                .position(|child| *child == prev)
                .map_or(siblings.len(), |index| index + 1);
            siblings.insert(index, id);
            self.entry_mut(id)?.parent = Some(parent);
        }
        Ok(())
    }

    fn prepend_to(&mut self, id: ViewId, parent: ViewId) -> Result<(), ReconcileError> {
        self.entry(parent)?;
        self.detach(id)?;
        self.entry_mut(parent)?.children.insert(0, id);
        self.entry_mut(id)?.parent = Some(parent);
        Ok(())
    }

    fn remove(&mut self, id: ViewId) -> Result<(), ReconcileError> {
        self.detach(id)?;
        self.release(id);
        Ok(())
    }

    fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.entry(id).ok()?.parent
    }

    fn children(&self, id: ViewId) -> Vec<ViewId> {
        self.entry(id)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    fn dump(&self) -> String {
        let mut output = String::new();
        for (id, entry) in &self.entries {
            if entry.parent.is_none() {
                self.dump_view(&mut output, id, 0);
            }
        }
        output
    }
}
