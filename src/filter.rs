//! Cable-type filtering: maps a cable to its permitted systems and exposes
//! the filtered view of a graph as an admissibility bitmap rather than a
//! pruned copy.

use crate::*;

/// Set of systems a cable may traverse
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SystemSet(Vec<SystemTag>);

impl SystemSet {
	pub fn new(mut tags: Vec<SystemTag>) -> Self {
		tags.sort();
		tags.dedup();
		Self(tags)
	}
	pub fn contains(&self, tag: SystemTag) -> bool {
		self.0.contains(&tag)
	}
	pub fn tags(&self) -> &[SystemTag] {
		&self.0
	}
}

impl std::fmt::Display for SystemSet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{{{}}}", self.0.iter().map(SystemTag::to_string).collect::<Vec<_>>().join(", "))
	}
}

/// The cable → permitted-systems rule table, closed at configuration time
#[derive(Clone, Debug)]
pub struct CableRules {
	table: indexmap::IndexMap<CableType, Vec<SystemTag>>,
}

impl CableRules {
	pub fn from_parameters(params: &Parameters) -> Self {
		Self { table: params.cables.clone() }
	}

	pub fn allowed_systems(&self, cable: CableType) -> Result<SystemSet, RouteError> {
		let tags = self.table.get(&cable)
			.ok_or_else(|| RouteError::UnknownCable(cable.to_string()))?;
		// the EXT tag is terminal-only, never traversable
		Ok(SystemSet::new(tags.iter().copied().filter(|&t| t != SystemTag::Ext).collect()))
	}
}

/// Per-edge and per-node admissibility of a graph under one cable's
/// permitted systems. Consulted by the search predicate; the arena itself is
/// never pruned.
#[derive(Clone, Debug)]
pub struct FilteredView {
	pub allowed: SystemSet,
	edge_ok: Vec<bool>,
	node_ok: Vec<bool>,
}

impl FilteredView {
	/// An edge is admissible when its own tag and both endpoint tags are
	/// permitted. External (`EXT`) endpoints are traversable so connector
	/// spurs stay reachable; the spur edges carry the host edge's system.
	pub fn build(graph: &RouteGraph, allowed: SystemSet) -> Self {
		let node_ok: Vec<bool> = graph.nodes()
			.map(|(_, n)| allowed.contains(n.sys) || n.sys == SystemTag::Ext)
			.collect();
		let edge_ok: Vec<bool> = graph.edges()
			.map(|(_, e)| allowed.contains(e.sys) && node_ok[e.u] && node_ok[e.v])
			.collect();
		let kept = edge_ok.iter().filter(|&&ok| ok).count();
		log::debug!("cable filter {} keeps {}/{} edges", allowed, kept, graph.edge_count());
		Self { allowed, edge_ok, node_ok }
	}

	pub fn edge_admissible(&self, e: EdgeIdx) -> bool {
		self.edge_ok[e]
	}

	pub fn node_admissible(&self, n: NodeIdx) -> bool {
		self.node_ok[n]
	}

	/// Admissible edges, in arena order
	pub fn edges<'a>(&'a self, graph: &'a RouteGraph) -> impl Iterator<Item = EdgeIdx> + 'a {
		graph.edges().filter_map(move |(e, _)| if self.edge_ok[e] { Some(e) } else { None })
	}
}

/// Validate that a request endpoint names a known node whose system the
/// cable permits. `EXT` nodes pass (endpoint/PPO use is exactly what they
/// are for).
pub fn validate_endpoint(graph: &RouteGraph, key: &str, cable: CableType, allowed: &SystemSet) -> Result<NodeIdx, RouteError> {
	let n = graph.require_node(key)?;
	let sys = graph.node(n).sys;
	if sys != SystemTag::Ext && !allowed.contains(sys) {
		return Err(RouteError::EndpointInForbiddenSystem { key: key.to_string(), sys, cable });
	}
	Ok(n)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::graph::test::{tagged, tramos_for};
	use pretty_assertions::assert_eq;

	fn two_system_graph() -> RouteGraph {
		let file = tagged! {
			nodes: [("(0, 0, 0)", A), ("(1, 0, 0)", A), ("(2, 0, 0)", B), ("(3, 0, 0)", B)],
			edges: [
				("(0, 0, 0)", "(1, 0, 0)", A),
				("(1, 0, 0)", "(2, 0, 0)", B),
				("(2, 0, 0)", "(3, 0, 0)", B),
			]
		};
		let map = tramos_for(&file);
		RouteGraph::build(&file, Some(&map)).unwrap()
	}

	#[test]
	fn rules_follow_configuration() {
		let rules = CableRules::from_parameters(&Parameters::default());
		assert_eq!(rules.allowed_systems(CableType::A).unwrap().tags(), &[SystemTag::A]);
		assert_eq!(rules.allowed_systems(CableType::C).unwrap().tags(), &[SystemTag::A, SystemTag::B]);
	}

	#[test]
	fn cable_a_drops_system_b_edges_and_the_bridge() {
		let g = two_system_graph();
		let rules = CableRules::from_parameters(&Parameters::default());
		let view = FilteredView::build(&g, rules.allowed_systems(CableType::A).unwrap());
		assert!(view.edge_admissible(0));
		assert!(!view.edge_admissible(1));
		assert!(!view.edge_admissible(2));
		assert_eq!(view.edges(&g).count(), 1);
	}

	#[test]
	fn cable_c_keeps_everything() {
		let g = two_system_graph();
		let rules = CableRules::from_parameters(&Parameters::default());
		let view = FilteredView::build(&g, rules.allowed_systems(CableType::C).unwrap());
		assert_eq!(view.edges(&g).count(), 3);
	}

	#[test]
	fn bridge_needs_both_endpoint_systems() {
		// edge 1 is tagged B but one endpoint sits in system A, so cable B
		// alone may not use it
		let g = two_system_graph();
		let rules = CableRules::from_parameters(&Parameters::default());
		let view = FilteredView::build(&g, rules.allowed_systems(CableType::B).unwrap());
		assert!(!view.edge_admissible(1));
		assert!(view.edge_admissible(2));
	}

	#[test]
	fn endpoint_validation() {
		let g = two_system_graph();
		let rules = CableRules::from_parameters(&Parameters::default());
		let allowed = rules.allowed_systems(CableType::A).unwrap();
		assert!(validate_endpoint(&g, "(0, 0, 0)", CableType::A, &allowed).is_ok());
		assert!(matches!(
			validate_endpoint(&g, "(2, 0, 0)", CableType::A, &allowed),
			Err(RouteError::EndpointInForbiddenSystem { sys: SystemTag::B, .. })
		));
		assert!(matches!(
			validate_endpoint(&g, "(9, 9, 9)", CableType::A, &allowed),
			Err(RouteError::UnknownNode(_))
		));
	}
}
