//! Core reconciliation engine for Trellis.
//!
//! A render pass produces a tree of [`VNode`]s. The [`Reconciler`] turns
//! that description into live views in a [`ViewTree`], and on later
//! passes compares each new description with the retained one using
//! structural [fingerprints](fingerprint), touching only what changed.

extern crate self as trellis_core;

pub mod collection;
pub mod collections;
pub mod controller;
pub mod error;
pub mod fingerprint;
pub mod platform;
pub mod property;
pub mod reconciler;
pub mod runtime;
pub mod value;
pub mod view;
pub mod vnode;

pub use collection::{CollectionState, Key};
pub use controller::{
    Controller, ControllerData, ControllerId, IdTarget, Lifecycle, Listener, Load, LoadError,
    LoadFuture, LoadState, Model, RenderScope, Scope,
};
pub use error::{PropertyError, ReconcileError};
pub use fingerprint::{hash_one, Fingerprint};
pub use platform::RuntimeScheduler;
pub use property::{Properties, PropertyDescriptor};
pub use reconciler::{Reconciler, RootId};
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle, Warning};
pub use trellis_macros::Properties;
pub use value::{FromValue, Value};
pub use view::{AsAny, MemoryViewTree, Placeholder, TextView, View, ViewId, ViewTree};
pub use vnode::{ControllerType, Element, ElementType, Live, NodeBuilder, Property, Rendered, VNode, VNodeKind};

#[cfg(test)]
#[path = "tests/fingerprint_tests.rs"]
mod fingerprint_tests;

#[cfg(test)]
#[path = "tests/vnode_tests.rs"]
mod vnode_tests;

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod reconciler_tests;

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod view_tests;
