#![allow(clippy::non_canonical_partial_ord_impl)] // False positive with Derivative

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display};
use std::sync::Arc;

use arcstr::ArcStr;
use derivative::Derivative;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::{Key, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Vertex,
    Edge,
}

/// Stable identifier of a graph element, enough to resolve it again later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: u64,
}

impl ElementRef {
    pub fn vertex(id: u64) -> Self {
        Self {
            kind: ElementKind::Vertex,
            id,
        }
    }

    pub fn edge(id: u64) -> Self {
        Self {
            kind: ElementKind::Edge,
            id,
        }
    }
}

impl Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ElementKind::Vertex => write!(f, "v[{}]", self.id),
            ElementKind::Edge => write!(f, "e[{}]", self.id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    pub label: ArcStr,
    pub properties: BTreeMap<ArcStr, Value>,
    /// `(out, in)` vertices of an edge.
    pub endpoints: Option<(ElementRef, ElementRef)>,
}

impl ElementData {
    pub fn new(label: impl Into<ArcStr>) -> Self {
        Self {
            label: label.into(),
            properties: BTreeMap::new(),
            endpoints: None,
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<ArcStr>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ElementForm {
    /// Backed by the live graph.
    Attached(Arc<ElementData>),
    /// Self-contained snapshot, independent of the graph it came from.
    Detached(Arc<ElementData>),
    /// Identifier and label only.
    Reference { label: ArcStr },
}

/// A vertex or an edge. Equality, ordering and hashing only look at the identifier.
#[derive(Clone, Debug, Serialize, Deserialize, Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Element {
    reference: ElementRef,

    #[derivative(
        PartialEq = "ignore",
        PartialOrd = "ignore",
        Ord = "ignore",
        Hash = "ignore"
    )]
    form: ElementForm,
}

impl Element {
    pub fn attached(reference: ElementRef, data: Arc<ElementData>) -> Self {
        Self {
            reference,
            form: ElementForm::Attached(data),
        }
    }

    pub fn detached(reference: ElementRef, data: ElementData) -> Self {
        Self {
            reference,
            form: ElementForm::Detached(Arc::new(data)),
        }
    }

    pub fn reference_to(reference: ElementRef, label: impl Into<ArcStr>) -> Self {
        Self {
            reference,
            form: ElementForm::Reference {
                label: label.into(),
            },
        }
    }

    pub fn reference(&self) -> ElementRef {
        self.reference
    }

    pub fn form(&self) -> &ElementForm {
        &self.form
    }

    pub fn data(&self) -> Option<&ElementData> {
        match &self.form {
            ElementForm::Attached(data) | ElementForm::Detached(data) => Some(data),
            ElementForm::Reference { .. } => None,
        }
    }

    pub fn label(&self) -> &ArcStr {
        match &self.form {
            ElementForm::Attached(data) | ElementForm::Detached(data) => &data.label,
            ElementForm::Reference { label } => label,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.data().and_then(|data| data.properties.get(key))
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.form, ElementForm::Attached(_))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.form, ElementForm::Detached(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.form, ElementForm::Reference { .. })
    }

    /// Lightweight identifier form.
    #[must_use]
    pub fn to_reference(&self) -> Self {
        Self::reference_to(self.reference, self.label().clone())
    }

    /// Self-contained snapshot. A reference has nothing to copy, so it detaches
    /// to a snapshot without properties.
    #[must_use]
    pub fn to_detached(&self) -> Self {
        match &self.form {
            ElementForm::Detached(_) => self.clone(),
            ElementForm::Attached(data) => Self::detached(self.reference, ElementData::clone(data)),
            ElementForm::Reference { label } => {
                Self::detached(self.reference, ElementData::new(label.clone()))
            }
        }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.reference)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn includes_out(self) -> bool {
        matches!(self, Self::Out | Self::Both)
    }

    pub fn includes_in(self) -> bool {
        matches!(self, Self::In | Self::Both)
    }
}

/// One slice of a partitioned graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Partition {
    pub index: usize,
    pub count: usize,
}

impl Partition {
    #[allow(clippy::cast_possible_wrap)]
    pub fn owns(&self, reference: &ElementRef) -> bool {
        Key::for_value(&Value::Int(reference.id as i64)).partition(self.count) == self.index
    }
}

/// Storage the engine reads graph elements from.
pub trait GraphProvider: Send + Sync {
    fn vertices(&self) -> Result<Vec<Element>>;

    fn resolve(&self, reference: &ElementRef) -> Result<Element>;

    fn adjacent(
        &self,
        vertex: &ElementRef,
        direction: Direction,
        labels: &[ArcStr],
    ) -> Result<Vec<Element>>;

    fn local_vertices(&self, partition: Partition) -> Result<Vec<Element>> {
        Ok(self
            .vertices()?
            .into_iter()
            .filter(|v| partition.owns(&v.reference()))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    vertices: BTreeMap<u64, Arc<ElementData>>,
    edges: BTreeMap<u64, Arc<ElementData>>,
    out_edges: HashMap<u64, Vec<u64>>,
    in_edges: HashMap<u64, Vec<u64>>,
    next_id: u64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_vertex(&mut self, data: ElementData) -> ElementRef {
        let id = self.allocate_id();
        self.vertices.insert(id, Arc::new(data));
        ElementRef::vertex(id)
    }

    pub fn add_edge(
        &mut self,
        out_vertex: ElementRef,
        in_vertex: ElementRef,
        mut data: ElementData,
    ) -> Result<ElementRef> {
        for endpoint in [out_vertex, in_vertex] {
            if !self.vertices.contains_key(&endpoint.id) || endpoint.kind != ElementKind::Vertex {
                return Err(Error::ElementNotFound(endpoint));
            }
        }
        let id = self.allocate_id();
        data.endpoints = Some((out_vertex, in_vertex));
        self.edges.insert(id, Arc::new(data));
        self.out_edges.entry(out_vertex.id).or_default().push(id);
        self.in_edges.entry(in_vertex.id).or_default().push(id);
        Ok(ElementRef::edge(id))
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn attached_vertex(&self, id: u64) -> Result<Element> {
        let reference = ElementRef::vertex(id);
        self.vertices
            .get(&id)
            .map(|data| Element::attached(reference, data.clone()))
            .ok_or(Error::ElementNotFound(reference))
    }

    fn neighbours<'a>(
        &'a self,
        index: &'a HashMap<u64, Vec<u64>>,
        vertex: u64,
        labels: &'a [ArcStr],
        pick: fn(&(ElementRef, ElementRef)) -> ElementRef,
    ) -> impl Iterator<Item = u64> + 'a {
        index
            .get(&vertex)
            .into_iter()
            .flatten()
            .filter_map(move |edge_id| self.edges.get(edge_id))
            .filter(move |edge| labels.is_empty() || labels.contains(&edge.label))
            .filter_map(move |edge| edge.endpoints.as_ref().map(pick))
            .map(|reference| reference.id)
    }
}

impl GraphProvider for MemoryGraph {
    fn vertices(&self) -> Result<Vec<Element>> {
        Ok(self
            .vertices
            .iter()
            .map(|(id, data)| Element::attached(ElementRef::vertex(*id), data.clone()))
            .collect())
    }

    fn resolve(&self, reference: &ElementRef) -> Result<Element> {
        let store = match reference.kind {
            ElementKind::Vertex => &self.vertices,
            ElementKind::Edge => &self.edges,
        };
        store
            .get(&reference.id)
            .map(|data| Element::attached(*reference, data.clone()))
            .ok_or(Error::ElementNotFound(*reference))
    }

    fn adjacent(
        &self,
        vertex: &ElementRef,
        direction: Direction,
        labels: &[ArcStr],
    ) -> Result<Vec<Element>> {
        if !self.vertices.contains_key(&vertex.id) {
            return Err(Error::ElementNotFound(*vertex));
        }
        let mut result = Vec::new();
        if direction.includes_out() {
            for id in self.neighbours(&self.out_edges, vertex.id, labels, |e| e.1) {
                result.push(self.attached_vertex(id)?);
            }
        }
        if direction.includes_in() {
            for id in self.neighbours(&self.in_edges, vertex.id, labels, |e| e.0) {
                result.push(self.attached_vertex(id)?);
            }
        }
        Ok(result)
    }
}
