//! Crusty data types for the cable-run exchange formats.
//!
//! Node identity is the canonical coordinate key `"(x, y, z)"` exactly as it
//! appears in the input file. Keys are never reformatted: the tramo map and
//! the graph must agree byte-for-byte.

use crate::*;

use serde::*;
use indexmap::IndexMap;

/// Canonical coordinate key, preserved verbatim from the input.
pub type Key = String;

/// Stable integer identifier of an undirected edge (the unit of the
/// forbidden set and of diagnostics).
pub type TramoId = u32;

/// A 3D coordinate. Serialized as a plain `[x, y, z]` array.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Point {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

impl Point {
	pub fn new(x: f64, y: f64, z: f64) -> Self {
		Self { x, y, z }
	}
	pub fn axis(&self, i: usize) -> f64 {
		match i {
			0 => self.x,
			1 => self.y,
			_ => self.z,
		}
	}
	/// Euclidean distance to another point
	pub fn dist(&self, other: &Point) -> f64 {
		let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
		(dx * dx + dy * dy + dz * dz).sqrt()
	}
	/// Manhattan (L1) distance to another point
	pub fn manhattan(&self, other: &Point) -> f64 {
		(self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
	}
	/// Canonical key form of this point.
	///
	/// Only used for points the program itself produces (virtual nodes,
	/// projections); keys read from files are kept as-is instead.
	pub fn key(&self) -> Key {
		format!("({}, {}, {})", self.x, self.y, self.z)
	}
	/// Parse a canonical key `"(x, y, z)"` into a point
	pub fn parse_key(key: &str) -> Result<Point, RouteError> {
		let inner = key.trim().strip_prefix('(').and_then(|s| s.strip_suffix(')'))
			.ok_or_else(|| RouteError::MalformedGraph(format!("coordinate key not parenthesised: {:?}", key)))?;
		let mut it = inner.split(',').map(|c| c.trim().parse::<f64>());
		match (it.next(), it.next(), it.next(), it.next()) {
			(Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) => Ok(Point::new(x, y, z)),
			_ => Err(RouteError::MalformedGraph(format!("invalid coordinate key: {:?}", key))),
		}
	}
}

impl std::fmt::Display for Point {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
	}
}

impl Serialize for Point {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		[self.x, self.y, self.z].serialize(s)
	}
}

impl<'de> Deserialize<'de> for Point {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		let [x, y, z] = <[f64; 3]>::deserialize(d)?;
		Ok(Point::new(x, y, z))
	}
}

/// System partition label of a node or edge
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum SystemTag {
	A,
	B,
	/// Distinguished tag of external connector nodes; never part of a
	/// cable's permitted set, usable only as an explicit endpoint or PPO.
	#[serde(rename = "EXT")]
	Ext,
}

impl std::fmt::Display for SystemTag {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SystemTag::A => write!(f, "A"),
			SystemTag::B => write!(f, "B"),
			SystemTag::Ext => write!(f, "EXT"),
		}
	}
}

/// Cable category selecting the permitted systems of a request
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CableType {
	A,
	B,
	C,
}

impl std::str::FromStr for CableType {
	type Err = RouteError;
	fn from_str(s: &str) -> Result<Self, RouteError> {
		match s {
			"A" | "a" => Ok(CableType::A),
			"B" | "b" => Ok(CableType::B),
			"C" | "c" => Ok(CableType::C),
			_ => Err(RouteError::UnknownCable(s.to_string())),
		}
	}
}

impl std::fmt::Display for CableType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CableType::A => write!(f, "A"),
			CableType::B => write!(f, "B"),
			CableType::C => write!(f, "C"),
		}
	}
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct NodeRec {
	pub sys: SystemTag,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct EdgeRec {
	pub from: Key,
	pub to: Key,
	pub sys: SystemTag,
}

/// Tagged graph wire format: `{nodes: {key → {sys}}, edges: [{from, to, sys}]}`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaggedGraphFile {
	pub nodes: IndexMap<Key, NodeRec>,
	pub edges: Vec<EdgeRec>,
}

/// Tramo map wire format: `{"keyLo-keyHi" → id}` with endpoint keys in
/// lexicographic order.
pub type TramoMapFile = IndexMap<String, TramoId>;

/// Forbidden-section wire format: array of tramo IDs.
pub type ForbiddenFile = Vec<TramoId>;

/// Neighbour entry of the legacy adjacency format: either a bare coordinate
/// triple or a canonical key.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum LegacyNeighbour {
	Coords(Point),
	Key(Key),
}

/// Legacy untagged adjacency format, read-only compatibility
pub type LegacyAdjacencyFile = IndexMap<Key, Vec<LegacyNeighbour>>;

/// Lift a legacy adjacency graph into the tagged model.
///
/// Every node and edge is tagged `A`, so a cable-A request reproduces
/// unfiltered routing over it.
pub fn legacy_to_tagged(legacy: LegacyAdjacencyFile) -> Result<TaggedGraphFile, RouteError> {
	let mut nodes: IndexMap<Key, NodeRec> = IndexMap::new();
	let mut edges = Vec::new();
	let mut seen = std::collections::HashSet::new();
	for key in legacy.keys() {
		Point::parse_key(key)?;
		nodes.insert(key.clone(), NodeRec { sys: SystemTag::A });
	}
	for (key, neighbours) in &legacy {
		for n in neighbours {
			let nkey = match n {
				LegacyNeighbour::Key(k) => k.clone(),
				LegacyNeighbour::Coords(p) => p.key(),
			};
			if !nodes.contains_key(&nkey) {
				Point::parse_key(&nkey)?;
				nodes.insert(nkey.clone(), NodeRec { sys: SystemTag::A });
			}
			if seen.insert(edge_key(key, &nkey)) {
				edges.push(EdgeRec { from: key.clone(), to: nkey, sys: SystemTag::A });
			}
		}
	}
	Ok(TaggedGraphFile { nodes, edges })
}

/// Canonical direction-independent edge key: the two endpoint keys joined by
/// `-` in lexicographic order.
pub fn edge_key(a: &str, b: &str) -> String {
	if a <= b {
		format!("{}-{}", a, b)
	} else {
		format!("{}-{}", b, a)
	}
}

/// Generate a tramo map for a tagged graph: sequential positive IDs in edge
/// order, keyed canonically. Logs the per-system edge distribution and any
/// cross-system bridges, which are the usual candidates for forbidden sets.
pub fn generate_tramo_map(file: &TaggedGraphFile) -> TramoMapFile {
	let mut map = TramoMapFile::new();
	let mut per_system: IndexMap<SystemTag, usize> = IndexMap::new();
	for edge in &file.edges {
		let id = map.len() as TramoId + 1;
		map.insert(edge_key(&edge.from, &edge.to), id);
		*per_system.entry(edge.sys).or_insert(0) += 1;
		let spans = (file.nodes.get(&edge.from), file.nodes.get(&edge.to));
		if let (Some(a), Some(b)) = spans {
			if a.sys != b.sys {
				log::info!("tramo {}: {} bridges system {} ↔ {}", id, edge_key(&edge.from, &edge.to), a.sys, b.sys);
			}
		}
	}
	for (sys, count) in &per_system {
		log::debug!("system {}: {} edge(s)", sys, count);
	}
	map
}

/// Result of one routing request
#[derive(Serialize, Clone, Debug)]
pub struct RouteResult {
	pub points: Vec<Point>,
	pub total_distance: f64,
	pub nodes_explored: usize,
	pub legs: Vec<LegInfo>,
	pub meta: RouteMeta,
}

#[derive(Serialize, Clone, Debug)]
pub struct LegInfo {
	pub from: Point,
	pub to: Point,
	pub points_count: usize,
	pub nodes_explored: usize,
	pub distance: f64,
}

#[derive(Serialize, Clone, Debug)]
pub struct RouteMeta {
	pub cable: CableType,
	pub allowed_systems: Vec<SystemTag>,
	pub forbidden_count: usize,
}
