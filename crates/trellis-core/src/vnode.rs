//! Virtual nodes: immutable-by-convention descriptions of a tree.
//!
//! A [`VNode`] describes either a text leaf, an element (a concrete
//! [`View`] type), a nested [`Controller`] or a keyed collection. Once
//! realized it remembers its live counterpart in [`Live`]; cloning a node
//! copies only the description.

use std::any::TypeId;
use std::fmt;

use indexmap::IndexMap;

use crate::collection::{CollectionState, Key};
use crate::controller::{Controller, ControllerId, Lifecycle};
use crate::error::PropertyError;
use crate::fingerprint::{self, combine, hash_one, Fingerprint, HOLE};
use crate::property::{is_reserved, Properties};
use crate::value::Value;
use crate::view::{TextView, View, ViewId};

/// A view type that can be instantiated from a virtual node.
pub trait Element: View + Properties + Default {}

impl<T: View + Properties + Default> Element for T {}

fn short_type_name<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

fn create_view<E: Element>() -> Box<dyn View> {
    Box::new(E::default())
}

fn apply_view_property<E: Element>(
    view: &mut dyn View,
    index: usize,
    value: &Value,
) -> Result<(), PropertyError> {
    let target = view
        .as_any_mut()
        .downcast_mut::<E>()
        .ok_or(PropertyError::new(short_type_name::<E>(), "foreign view"))?;
    target.apply_property(index, value)
}

fn create_controller<C: Controller + Properties + Default>() -> Box<dyn Controller> {
    Box::new(C::default())
}

fn apply_controller_property<C: Controller + Properties + Default>(
    controller: &mut dyn Controller,
    index: usize,
    value: &Value,
) -> Result<(), PropertyError> {
    let target = controller
        .as_any_mut()
        .downcast_mut::<C>()
        .ok_or(PropertyError::new(short_type_name::<C>(), "foreign controller"))?;
    target.apply_property(index, value)
}

/// Type descriptor of an element node.
#[derive(Clone, Copy)]
pub struct ElementType {
    name: &'static str,
    type_id: TypeId,
    create: fn() -> Box<dyn View>,
    resolve: fn(&str) -> Option<usize>,
    apply: fn(&mut dyn View, usize, &Value) -> Result<(), PropertyError>,
}

impl ElementType {
    pub fn of<E: Element>() -> Self {
        Self {
            name: short_type_name::<E>(),
            type_id: TypeId::of::<E>(),
            create: create_view::<E>,
            resolve: E::property_index,
            apply: apply_view_property::<E>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn instantiate(&self) -> Box<dyn View> {
        (self.create)()
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type descriptor of a controller node.
#[derive(Clone, Copy)]
pub struct ControllerType {
    name: &'static str,
    type_id: TypeId,
    create: fn() -> Box<dyn Controller>,
    resolve: fn(&str) -> Option<usize>,
    apply: fn(&mut dyn Controller, usize, &Value) -> Result<(), PropertyError>,
}

impl ControllerType {
    pub fn of<C: Controller + Properties + Default>() -> Self {
        Self {
            name: short_type_name::<C>(),
            type_id: TypeId::of::<C>(),
            create: create_controller::<C>,
            resolve: C::property_index,
            apply: apply_controller_property::<C>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Controller> {
        (self.create)()
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<usize> {
        (self.resolve)(name)
    }

    pub(crate) fn apply(
        &self,
        controller: &mut dyn Controller,
        index: usize,
        value: &Value,
    ) -> Result<(), PropertyError> {
        (self.apply)(controller, index, value)
    }
}

impl PartialEq for ControllerType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VNodeKind {
    Text,
    Element(ElementType),
    Controller(ControllerType),
    Collection,
}

impl VNodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            VNodeKind::Text => "Text",
            VNodeKind::Element(ty) => ty.name,
            VNodeKind::Controller(ty) => ty.name,
            VNodeKind::Collection => "Collection",
        }
    }

    fn type_hash(&self) -> Fingerprint {
        match self {
            VNodeKind::Text => hash_one(&TypeId::of::<TextView>()),
            VNodeKind::Element(ty) => hash_one(&ty.type_id),
            VNodeKind::Controller(ty) => hash_one(&ty.type_id),
            VNodeKind::Collection => hash_one("#collection"),
        }
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        if is_reserved(name) {
            return None;
        }
        match self {
            VNodeKind::Text => TextView::property_index(name),
            VNodeKind::Element(ty) => (ty.resolve)(name),
            VNodeKind::Controller(ty) => (ty.resolve)(name),
            VNodeKind::Collection => None,
        }
    }

    pub(crate) fn instantiate_view(&self) -> Option<Box<dyn View>> {
        match self {
            VNodeKind::Text => Some(Box::new(TextView::default())),
            VNodeKind::Element(ty) => Some(ty.instantiate()),
            _ => None,
        }
    }

    pub(crate) fn apply_view(
        &self,
        view: &mut dyn View,
        index: usize,
        value: &Value,
    ) -> Result<(), PropertyError> {
        match self {
            VNodeKind::Text => apply_view_property::<TextView>(view, index, value),
            VNodeKind::Element(ty) => (ty.apply)(view, index, value),
            _ => Err(PropertyError::new(self.name(), "view")),
        }
    }
}

/// A property as stored on a node, with its precomputed fingerprint.
#[derive(Debug, Clone)]
pub struct Property {
    value: Value,
    fingerprint: Fingerprint,
    pub(crate) slot: Option<usize>,
}

impl Property {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Live counterpart of a realized node.
#[derive(Debug)]
pub enum Live {
    View(ViewId),
    Controller(ControllerId),
    Collection(CollectionState),
}

pub struct VNode {
    pub(crate) kind: VNodeKind,
    pub(crate) props: IndexMap<&'static str, Property>,
    pub(crate) props_fingerprint: Fingerprint,
    pub(crate) children: Vec<Option<VNode>>,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) live: Option<Live>,
}

impl VNode {
    pub fn new(
        kind: VNodeKind,
        props: impl IntoIterator<Item = (&'static str, Value)>,
        mut children: Vec<Option<VNode>>,
    ) -> Self {
        if kind == VNodeKind::Collection {
            children.retain(Option::is_some);
        }
        let mut map: IndexMap<&'static str, Property> = IndexMap::new();
        for (name, value) in props {
            let property = Property {
                fingerprint: fingerprint::property(name, &value),
                slot: kind.resolve(name),
                value,
            };
            map.insert(name, property);
        }
        let props_fingerprint = map
            .values()
            .fold(0, |h, property| combine(h, property.fingerprint));
        let fingerprint = children.iter().fold(
            fingerprint::node(kind.type_hash(), props_fingerprint),
            |h, child| combine(h, child.as_ref().map_or(HOLE, |child| child.fingerprint)),
        );
        Self {
            kind,
            props: map,
            props_fingerprint,
            children,
            fingerprint,
            live: None,
        }
    }

    /// A text leaf.
    pub fn text(value: impl Into<Value>) -> Self {
        let value = match value.into() {
            Value::Text(text) => Value::Text(text),
            other => Value::Text(other.to_string()),
        };
        Self::new(VNodeKind::Text, [("value", value)], Vec::new())
    }

    /// This node with `key` set, for use as a collection item.
    pub fn keyed(self, key: impl Into<Value>) -> Self {
        let VNode {
            kind,
            props,
            children,
            ..
        } = self;
        let props = props
            .into_iter()
            .map(|(name, property)| (name, property.value))
            .chain(std::iter::once(("key", key.into())));
        Self::new(kind, props, children)
    }

    pub fn element<E: Element>() -> NodeBuilder {
        NodeBuilder::new(VNodeKind::Element(ElementType::of::<E>()))
    }

    pub fn controller<C: Controller + Properties + Default>() -> NodeBuilder {
        NodeBuilder::new(VNodeKind::Controller(ControllerType::of::<C>()))
    }

    /// A keyed collection; absent items are dropped.
    pub fn collection<I, R>(items: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rendered>,
    {
        let items = items
            .into_iter()
            .filter_map(|item| Into::<Rendered>::into(item).into_node())
            .map(Some)
            .collect();
        Self::new(VNodeKind::Collection, [], items)
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.kind
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn props_fingerprint(&self) -> Fingerprint {
        self.props_fingerprint
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name).map(Property::value)
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn props(&self) -> impl Iterator<Item = (&'static str, &Property)> + '_ {
        self.props.iter().map(|(name, property)| (*name, property))
    }

    pub fn children(&self) -> &[Option<VNode>] {
        &self.children
    }

    pub fn key(&self) -> Option<Key> {
        self.prop("key")
            .filter(|value| !value.is_null())
            .map(Key::from_value)
    }

    /// The item of a realized collection currently standing for `key`.
    pub fn item(&self, key: &Key) -> Option<&VNode> {
        match &self.live {
            Some(Live::Collection(state)) => self.children.get(state.index_of(key)?)?.as_ref(),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<String> {
        match self.prop("id")? {
            Value::Null => None,
            value => Some(value.to_string()),
        }
    }

    pub fn live(&self) -> Option<&Live> {
        self.live.as_ref()
    }

    pub fn is_realized(&self) -> bool {
        self.live.is_some()
    }

    pub fn controller_id(&self) -> Option<ControllerId> {
        match self.live {
            Some(Live::Controller(id)) => Some(id),
            _ => None,
        }
    }

    pub fn view_id(&self) -> Option<ViewId> {
        match self.live {
            Some(Live::View(id)) => Some(id),
            _ => None,
        }
    }
}

impl Clone for VNode {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            props: self.props.clone(),
            props_fingerprint: self.props_fingerprint,
            children: self.children.clone(),
            fingerprint: self.fingerprint,
            live: None,
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.kind.name())
            .field("fingerprint", &format_args!("{:#018x}", self.fingerprint))
            .field("props", &self.props)
            .field("children", &self.children)
            .field("live", &self.live)
            .finish()
    }
}

pub struct NodeBuilder {
    kind: VNodeKind,
    props: Vec<(&'static str, Value)>,
    children: Vec<Option<VNode>>,
}

impl NodeBuilder {
    fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.props.push((name, value.into()));
        self
    }

    pub fn key(self, key: impl Into<Value>) -> Self {
        self.prop("key", key)
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.prop("id", id.into())
    }

    /// Route a lifecycle event of this controller to a handler named
    /// `handler` on the nearest owner that declares it.
    pub fn on(self, event: Lifecycle, handler: impl Into<String>) -> Self {
        self.prop(event.property_name(), handler.into())
    }

    pub fn child(mut self, child: impl Into<Rendered>) -> Self {
        self.children.push(Into::<Rendered>::into(child).into_node());
        self
    }

    pub fn children<I, R>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rendered>,
    {
        self.children
            .extend(children.into_iter().map(|child| Into::<Rendered>::into(child).into_node()));
        self
    }

    pub fn build(self) -> VNode {
        VNode::new(self.kind, self.props, self.children)
    }
}

impl From<NodeBuilder> for VNode {
    fn from(builder: NodeBuilder) -> Self {
        builder.build()
    }
}

/// Output of a render function before normalization.
#[derive(Debug, Clone)]
pub enum Rendered {
    Empty,
    Node(VNode),
    Text(String),
    List(Vec<Rendered>),
}

impl Rendered {
    /// Normalize into an optional node. Text becomes a text leaf. A list
    /// of no items is nothing and a list of one item is that item. Longer
    /// lists become a collection of their non-empty items.
    pub fn into_node(self) -> Option<VNode> {
        match self {
            Rendered::Empty => None,
            Rendered::Node(node) => Some(node),
            Rendered::Text(text) => Some(VNode::text(text)),
            Rendered::List(mut items) => match items.len() {
                0 => None,
                1 => items.pop().and_then(Rendered::into_node),
                _ => Some(VNode::collection(items)),
            },
        }
    }
}

impl From<VNode> for Rendered {
    fn from(node: VNode) -> Self {
        Rendered::Node(node)
    }
}

impl From<NodeBuilder> for Rendered {
    fn from(builder: NodeBuilder) -> Self {
        Rendered::Node(builder.build())
    }
}

impl From<()> for Rendered {
    fn from(_: ()) -> Self {
        Rendered::Empty
    }
}

impl From<bool> for Rendered {
    fn from(flag: bool) -> Self {
        if flag {
            Rendered::Text("true".to_owned())
        } else {
            Rendered::Empty
        }
    }
}

impl From<&str> for Rendered {
    fn from(text: &str) -> Self {
        Rendered::Text(text.to_owned())
    }
}

impl From<String> for Rendered {
    fn from(text: String) -> Self {
        Rendered::Text(text)
    }
}

impl From<Value> for Rendered {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Rendered::Empty,
            Value::Bool(flag) => flag.into(),
            Value::List(items) => Rendered::List(items.into_iter().map(Into::into).collect()),
            other => Rendered::Text(other.to_string()),
        }
    }
}

macro_rules! rendered_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Rendered {
                fn from(number: $ty) -> Self {
                    Rendered::Text(number.to_string())
                }
            }
        )*
    };
}

rendered_from_number!(i32, i64, u32, usize, f32, f64);

impl<T: Into<Rendered>> From<Option<T>> for Rendered {
    fn from(value: Option<T>) -> Self {
        value.map_or(Rendered::Empty, Into::into)
    }
}

impl<T: Into<Rendered>> From<Vec<T>> for Rendered {
    fn from(items: Vec<T>) -> Self {
        Rendered::List(items.into_iter().map(Into::into).collect())
    }
}
