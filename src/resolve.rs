//! Resolution of arbitrary query coordinates onto the (overlaid) graph.
//!
//! A query point becomes an exact node, an edge endpoint, or a virtual node
//! split into the search overlay; anything farther than the matching
//! tolerance from the graph is rejected.

use crate::*;

/// Resolve a query point to a node of the overlaid graph.
///
/// 1. an exact canonical-key match wins;
/// 2. otherwise the point is projected onto the nearest admissible edge;
/// 3. a projection within `snap_epsilon` of an endpoint resolves to that
///    endpoint, anything else splits the edge at the projection.
pub fn resolve_point(
	overlay: &mut Overlay<'_>,
	index: &GridIndex<'_>,
	params: &Parameters,
	p: &Point,
) -> Result<NodeRef, RouteError> {
	let graph = overlay.graph();
	if let Some(n) = graph.node_by_key(&p.key()) {
		log::debug!("resolved {} to node {} exactly", p, graph.node(n).key);
		return Ok(NodeRef::Base(n));
	}
	let hit = index.nearest_edge(p).ok_or(RouteError::NoEdgeFound)?;
	let quality = MatchQuality::of(hit.distance);
	if hit.distance > params.tolerance {
		return Err(RouteError::PointNotOnGraph {
			point: *p,
			nearest_distance: hit.distance,
			quality,
		});
	}
	let edge = graph.edge(hit.edge);
	for &(endpoint, t_end) in &[(edge.u, 0.0), (edge.v, 1.0)] {
		let at = graph.node(endpoint).at;
		if hit.projection.dist(&at) <= params.snap_epsilon || (hit.t - t_end).abs() * edge.len <= params.snap_epsilon {
			log::debug!("resolved {} to endpoint {} of edge {} ({}, {:.3} off)", p, graph.node(endpoint).key, graph.canonical_edge_key(hit.edge), quality, hit.distance);
			return Ok(NodeRef::Base(endpoint));
		}
	}
	log::debug!("resolved {} onto edge {} at t={:.4} ({}, {:.3} off)", p, graph.canonical_edge_key(hit.edge), hit.t, quality, hit.distance);
	Ok(overlay.split(hit.edge, hit.t, hit.projection))
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::graph::test::tagged;
	use pretty_assertions::assert_eq;

	fn setup() -> (RouteGraph, Parameters) {
		let file = tagged! {
			nodes: [("(0, 0, 0)", A), ("(10, 0, 0)", A), ("(10, 10, 0)", A)],
			edges: [("(0, 0, 0)", "(10, 0, 0)", A), ("(10, 0, 0)", "(10, 10, 0)", A)]
		};
		(RouteGraph::build(&file, None).unwrap(), Parameters::default())
	}

	fn resolve(g: &RouteGraph, params: &Parameters, p: Point) -> Result<(NodeRef, Option<Point>), RouteError> {
		let rules = CableRules::from_parameters(params);
		let view = FilteredView::build(g, rules.allowed_systems(CableType::A).unwrap());
		let index = GridIndex::build(g, &view, params)?;
		let mut overlay = Overlay::new(g);
		let n = resolve_point(&mut overlay, &index, params, &p)?;
		let virt = match n {
			NodeRef::Virtual(_) => Some(overlay.point_of(n)),
			NodeRef::Base(_) => None,
		};
		Ok((n, virt))
	}

	#[test]
	fn exact_key_match_wins() {
		let (g, params) = setup();
		let (n, virt) = resolve(&g, &params, Point::new(10.0, 0.0, 0.0)).unwrap();
		assert_eq!(n, NodeRef::Base(g.node_by_key("(10, 0, 0)").unwrap()));
		assert_eq!(virt, None);
	}

	#[test]
	fn near_node_snaps_without_split() {
		// within tolerance of the graph but essentially at an endpoint
		let (g, params) = setup();
		let (n, virt) = resolve(&g, &params, Point::new(10.0000000002, 0.0, 0.0)).unwrap();
		assert_eq!(n, NodeRef::Base(g.node_by_key("(10, 0, 0)").unwrap()));
		assert_eq!(virt, None);
	}

	#[test]
	fn interior_projection_splits_edge() {
		let (g, params) = setup();
		let (n, virt) = resolve(&g, &params, Point::new(4.0, 0.5, 0.0)).unwrap();
		assert!(matches!(n, NodeRef::Virtual(_)));
		assert_eq!(virt, Some(Point::new(4.0, 0.0, 0.0)));
	}

	#[test]
	fn far_point_is_rejected_with_quality() {
		let (g, params) = setup();
		match resolve(&g, &params, Point::new(5.0, 7.0, 0.0)) {
			Err(RouteError::PointNotOnGraph { nearest_distance, quality, .. }) => {
				assert!((nearest_distance - 5.0).abs() < 1e-9);
				assert_eq!(quality, MatchQuality::Poor);
			}
			other => panic!("expected PointNotOnGraph, got {:?}", other.map(|_| ())),
		}
	}
}
