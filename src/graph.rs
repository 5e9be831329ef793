//! Data structures to operate on tagged cable-run graphs.
//!
//! The shared graph is an immutable arena (node and edge vectors plus an
//! adjacency table); everything a single search mutates lives in a thin
//! [`Overlay`] so concurrent requests can share one loaded graph.

use std::collections::{HashMap, HashSet};

use crate::*;

pub type NodeIdx = usize;
pub type EdgeIdx = usize;

/// A graph node: canonical key, parsed coordinate, system tag
#[derive(Clone, Debug)]
pub struct Node {
	pub key: Key,
	pub at: Point,
	pub sys: SystemTag,
}

/// An undirected edge between two arena nodes
#[derive(Clone, Debug)]
pub struct Edge {
	pub u: NodeIdx,
	pub v: NodeIdx,
	pub sys: SystemTag,
	pub tramo: Option<TramoId>,
	pub len: f64,
}

impl Edge {
	/// Assuming `n` is one end of the edge, what is the other end
	pub fn other(&self, n: NodeIdx) -> NodeIdx {
		if n == self.u {
			self.v
		} else {
			self.u
		}
	}
}

/// Immutable arena representation of a tagged graph.
///
/// Canonical-key lookups go through a map populated once from the input's own
/// key strings; coordinates are parsed for geometry but never re-serialized
/// as identity.
#[derive(Clone, Debug)]
pub struct RouteGraph {
	nodes: Vec<Node>,
	edges: Vec<Edge>,
	adjacency: Vec<Vec<EdgeIdx>>,
	by_key: HashMap<Key, NodeIdx>,
	by_tramo: HashMap<TramoId, EdgeIdx>,
}

impl RouteGraph {
	/// Construct the arena from the wire model, validating structure and,
	/// when supplied, the tramo map (which must be a bijection covering
	/// exactly the edges present).
	pub fn build(file: &TaggedGraphFile, tramo_map: Option<&TramoMapFile>) -> Result<Self, RouteError> {
		let mut nodes = Vec::with_capacity(file.nodes.len());
		let mut by_key = HashMap::with_capacity(file.nodes.len());
		for (key, rec) in &file.nodes {
			let at = Point::parse_key(key)?;
			by_key.insert(key.clone(), nodes.len());
			nodes.push(Node { key: key.clone(), at, sys: rec.sys });
		}
		let mut edges: Vec<Edge> = Vec::with_capacity(file.edges.len());
		let mut adjacency = vec![Vec::new(); nodes.len()];
		let mut seen_pairs = HashSet::new();
		for rec in &file.edges {
			let u = *by_key.get(&rec.from)
				.ok_or_else(|| RouteError::MalformedGraph(format!("edge endpoint {} is not a node", rec.from)))?;
			let v = *by_key.get(&rec.to)
				.ok_or_else(|| RouteError::MalformedGraph(format!("edge endpoint {} is not a node", rec.to)))?;
			if u == v {
				return Err(RouteError::MalformedGraph(format!("self-edge at {}", rec.from)));
			}
			if !seen_pairs.insert((u.min(v), u.max(v))) {
				log::debug!("dropping duplicate edge {} - {}", rec.from, rec.to);
				continue;
			}
			let e = edges.len();
			let len = nodes[u].at.dist(&nodes[v].at);
			edges.push(Edge { u, v, sys: rec.sys, tramo: None, len });
			adjacency[u].push(e);
			adjacency[v].push(e);
		}
		let mut by_tramo = HashMap::new();
		if let Some(map) = tramo_map {
			let mut expected: HashMap<String, EdgeIdx> = edges.iter().enumerate()
				.map(|(e, edge)| (edge_key(&nodes[edge.u].key, &nodes[edge.v].key), e))
				.collect();
			for (ek, &id) in map {
				let e = expected.remove(ek)
					.ok_or_else(|| RouteError::MalformedGraph(format!("tramo map names unknown edge {}", ek)))?;
				if by_tramo.insert(id, e).is_some() {
					return Err(RouteError::MalformedGraph(format!("duplicate tramo ID {}", id)));
				}
				edges[e].tramo = Some(id);
			}
			if let Some(ek) = expected.keys().next() {
				return Err(RouteError::MalformedGraph(format!("tramo map missing edge {}", ek)));
			}
		}
		log::debug!("built graph with {} nodes and {} edges", nodes.len(), edges.len());
		Ok(Self { nodes, edges, adjacency, by_key, by_tramo })
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}
	pub fn edge_count(&self) -> usize {
		self.edges.len()
	}
	pub fn node(&self, n: NodeIdx) -> &Node {
		&self.nodes[n]
	}
	pub fn edge(&self, e: EdgeIdx) -> &Edge {
		&self.edges[e]
	}
	pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
		self.nodes.iter().enumerate()
	}
	pub fn edges(&self) -> impl Iterator<Item = (EdgeIdx, &Edge)> {
		self.edges.iter().enumerate()
	}
	/// Edges incident to a node
	pub fn incident(&self, n: NodeIdx) -> &[EdgeIdx] {
		&self.adjacency[n]
	}
	pub fn node_by_key(&self, key: &str) -> Option<NodeIdx> {
		self.by_key.get(key).copied()
	}
	pub fn require_node(&self, key: &str) -> Result<NodeIdx, RouteError> {
		self.node_by_key(key).ok_or_else(|| RouteError::UnknownNode(key.to_string()))
	}
	pub fn edge_by_tramo(&self, id: TramoId) -> Option<EdgeIdx> {
		self.by_tramo.get(&id).copied()
	}
	/// Canonical direction-independent key of an edge
	pub fn canonical_edge_key(&self, e: EdgeIdx) -> String {
		let edge = &self.edges[e];
		edge_key(&self.nodes[edge.u].key, &self.nodes[edge.v].key)
	}
	/// Whether a tramo map was attached at build time
	pub fn has_tramo_ids(&self) -> bool {
		!self.by_tramo.is_empty()
	}
	/// Rebuild the wire model from the arena (used when emitting derived
	/// graphs such as the external connector's extended artifact).
	pub fn to_file(&self) -> TaggedGraphFile {
		TaggedGraphFile {
			nodes: self.nodes.iter().map(|n| (n.key.clone(), NodeRec { sys: n.sys })).collect(),
			edges: self.edges.iter().map(|e| EdgeRec {
				from: self.nodes[e.u].key.clone(),
				to: self.nodes[e.v].key.clone(),
				sys: e.sys,
			}).collect(),
		}
	}
}

/// Reference to either an arena node or a per-search virtual node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NodeRef {
	Base(NodeIdx),
	Virtual(usize),
}

/// A virtual node inserted on an edge by the edge-splitting resolver
#[derive(Clone, Debug)]
pub struct VirtualNode {
	pub key: Key,
	pub at: Point,
	pub sys: SystemTag,
	/// Edge this node was split out of
	pub base: EdgeIdx,
	/// Projection parameter along `base`, in (0, 1)
	pub t: f64,
}

/// Per-search mutable view over a shared [`RouteGraph`].
///
/// An edge with at least one virtual node on it is hidden; traversal walks
/// the chain endpoint → virtual… → endpoint instead. Sub-edges inherit the
/// base edge's system tag and tramo ID, so admissibility predicates keep
/// working on the base edge index. Discarded when the search returns.
pub struct Overlay<'g> {
	graph: &'g RouteGraph,
	virtuals: Vec<VirtualNode>,
	/// base edge → virtual-node indices ordered by ascending `t`
	chains: HashMap<EdgeIdx, Vec<usize>>,
}

impl<'g> Overlay<'g> {
	pub fn new(graph: &'g RouteGraph) -> Self {
		Self { graph, virtuals: Vec::new(), chains: HashMap::new() }
	}

	pub fn graph(&self) -> &'g RouteGraph {
		self.graph
	}

	pub fn point_of(&self, n: NodeRef) -> Point {
		match n {
			NodeRef::Base(i) => self.graph.node(i).at,
			NodeRef::Virtual(i) => self.virtuals[i].at,
		}
	}

	pub fn sys_of(&self, n: NodeRef) -> SystemTag {
		match n {
			NodeRef::Base(i) => self.graph.node(i).sys,
			NodeRef::Virtual(i) => self.virtuals[i].sys,
		}
	}

	pub fn key_of(&self, n: NodeRef) -> &str {
		match n {
			NodeRef::Base(i) => &self.graph.node(i).key,
			NodeRef::Virtual(i) => &self.virtuals[i].key,
		}
	}

	/// Insert a virtual node on `edge` at parameter `t` (projection point
	/// `at`), keeping the chain ordered. Re-splitting at an existing virtual
	/// node returns that node instead of stacking duplicates.
	pub fn split(&mut self, edge: EdgeIdx, t: f64, at: Point) -> NodeRef {
		if let Some(chain) = self.chains.get(&edge) {
			for &vi in chain {
				if (self.virtuals[vi].t - t).abs() < 1e-12 || self.virtuals[vi].at.dist(&at) < 1e-9 {
					return NodeRef::Virtual(vi);
				}
			}
		}
		let sys = self.graph.edge(edge).sys;
		let vi = self.virtuals.len();
		self.virtuals.push(VirtualNode { key: at.key(), at, sys, base: edge, t });
		let virtuals = &self.virtuals;
		let chain = self.chains.entry(edge).or_default();
		let pos = chain.iter().position(|&o| virtuals[o].t > t).unwrap_or(chain.len());
		chain.insert(pos, vi);
		log::debug!("split edge {} at t={:.4} → virtual node {}", self.graph.canonical_edge_key(edge), t, at);
		NodeRef::Virtual(vi)
	}

	/// Whether an edge has been replaced by split sub-edges
	pub fn is_split(&self, edge: EdgeIdx) -> bool {
		self.chains.contains_key(&edge)
	}

	/// Neighbours of a node under the overlay: `(neighbour, base edge,
	/// sub-edge length)`. The base edge index is what admissibility
	/// predicates and tramo lookups consume.
	pub fn neighbours(&self, n: NodeRef) -> Vec<(NodeRef, EdgeIdx, f64)> {
		let mut out = Vec::new();
		match n {
			NodeRef::Base(i) => {
				let at = self.graph.node(i).at;
				for &e in self.graph.incident(i) {
					let edge = self.graph.edge(e);
					match self.chains.get(&e) {
						Some(chain) => {
							// walk onto the nearest virtual node of the chain
							let vi = if edge.u == i { chain[0] } else { chain[chain.len() - 1] };
							let v = &self.virtuals[vi];
							out.push((NodeRef::Virtual(vi), e, at.dist(&v.at)));
						}
						None => {
							let o = edge.other(i);
							out.push((NodeRef::Base(o), e, edge.len));
						}
					}
				}
			}
			NodeRef::Virtual(i) => {
				let v = &self.virtuals[i];
				let chain = &self.chains[&v.base];
				let pos = chain.iter().position(|&o| o == i).expect("virtual node missing from its chain");
				let edge = self.graph.edge(v.base);
				let prev = if pos == 0 {
					NodeRef::Base(edge.u)
				} else {
					NodeRef::Virtual(chain[pos - 1])
				};
				let next = if pos + 1 == chain.len() {
					NodeRef::Base(edge.v)
				} else {
					NodeRef::Virtual(chain[pos + 1])
				};
				out.push((prev, v.base, v.at.dist(&self.point_of(prev))));
				out.push((next, v.base, v.at.dist(&self.point_of(next))));
			}
		}
		out
	}
}

#[cfg(test)]
pub(crate) mod test {
	use super::*;
	use pretty_assertions::assert_eq;

	/// Build a tagged graph file from terse node/edge listings
	macro_rules! tagged {
		(nodes: [$(($key:expr, $sys:ident)),* $(,)?], edges: [$(($from:expr, $to:expr, $esys:ident)),* $(,)?]) => {
			TaggedGraphFile {
				nodes: vec![$(($key.to_string(), NodeRec { sys: SystemTag::$sys })),*].into_iter().collect(),
				edges: vec![$(EdgeRec { from: $from.to_string(), to: $to.to_string(), sys: SystemTag::$esys }),*],
			}
		};
	}
	pub(crate) use tagged;

	/// Assign sequential tramo IDs to every edge of a file
	pub(crate) fn tramos_for(file: &TaggedGraphFile) -> TramoMapFile {
		file.edges.iter().enumerate()
			.map(|(i, e)| (edge_key(&e.from, &e.to), (i + 1) as TramoId))
			.collect()
	}

	fn line3() -> TaggedGraphFile {
		tagged! {
			nodes: [("(0, 0, 0)", A), ("(4, 0, 0)", A), ("(4, 3, 0)", A)],
			edges: [("(0, 0, 0)", "(4, 0, 0)", A), ("(4, 0, 0)", "(4, 3, 0)", A)]
		}
	}

	#[test]
	fn build_and_lookup() {
		let file = line3();
		let map = tramos_for(&file);
		let g = RouteGraph::build(&file, Some(&map)).unwrap();
		assert_eq!(g.node_count(), 3);
		assert_eq!(g.edge_count(), 2);
		let n = g.require_node("(4, 0, 0)").unwrap();
		assert_eq!(g.incident(n).len(), 2);
		assert_eq!(g.edge(0).len, 4.0);
		assert_eq!(g.edge(0).tramo, Some(1));
		assert_eq!(g.edge_by_tramo(2), Some(1));
		assert!(matches!(g.require_node("(9, 9, 9)"), Err(RouteError::UnknownNode(_))));
	}

	#[test]
	fn rejects_dangling_edge() {
		let mut file = line3();
		file.edges.push(EdgeRec { from: "(0, 0, 0)".into(), to: "(7, 7, 7)".into(), sys: SystemTag::A });
		assert!(matches!(RouteGraph::build(&file, None), Err(RouteError::MalformedGraph(_))));
	}

	#[test]
	fn rejects_duplicate_tramo_ids() {
		let file = line3();
		let mut map = tramos_for(&file);
		for id in map.values_mut() {
			*id = 7;
		}
		assert!(matches!(RouteGraph::build(&file, Some(&map)), Err(RouteError::MalformedGraph(_))));
	}

	#[test]
	fn rejects_tramo_map_not_covering_edges() {
		let file = line3();
		let mut map = tramos_for(&file);
		map.pop();
		assert!(matches!(RouteGraph::build(&file, Some(&map)), Err(RouteError::MalformedGraph(_))));
		let mut map = tramos_for(&file);
		map.insert("(9, 9, 9)-(9, 9, 10)".to_string(), 99);
		assert!(matches!(RouteGraph::build(&file, Some(&map)), Err(RouteError::MalformedGraph(_))));
	}

	#[test]
	fn overlay_split_chains_stay_ordered() {
		let file = line3();
		let g = RouteGraph::build(&file, None).unwrap();
		let mut ov = Overlay::new(&g);
		// split the x-axis edge twice, out of order
		let b = ov.split(0, 0.75, Point::new(3.0, 0.0, 0.0));
		let a = ov.split(0, 0.25, Point::new(1.0, 0.0, 0.0));
		assert_ne!(a, b);
		assert_eq!(ov.split(0, 0.25, Point::new(1.0, 0.0, 0.0)), a);
		// u end now walks onto the t=0.25 virtual
		let u = g.node_by_key("(0, 0, 0)").unwrap();
		let nb = ov.neighbours(NodeRef::Base(u));
		assert_eq!(nb.len(), 1);
		assert_eq!(nb[0].0, a);
		assert!((nb[0].2 - 1.0).abs() < 1e-12);
		// the t=0.25 virtual sees u and the t=0.75 virtual
		let nb = ov.neighbours(a);
		assert_eq!(nb.len(), 2);
		assert_eq!(nb[0].0, NodeRef::Base(u));
		assert_eq!(nb[1].0, b);
		assert!((nb[1].2 - 2.0).abs() < 1e-12);
		// and every sub-edge still reports the base edge index
		assert!(nb.iter().all(|&(_, e, _)| e == 0));
	}
}
