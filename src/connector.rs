//! External point connector: attaches an off-graph point to the network via
//! the nearest admissible edge plus an orthogonal (Manhattan) approach.
//!
//! The output is a fresh, derived graph artifact; the loaded base graph is
//! never mutated.

use itertools::Itertools;
use serde::Serialize;

use crate::*;

const AXES: [char; 3] = ['X', 'Y', 'Z'];

/// One axis-ordered orthogonal route between two points
#[derive(Serialize, Clone, Debug)]
pub struct ManhattanRoute {
	/// Axis ordering, e.g. `"X→Z→Y"`; zero-delta axes are omitted
	pub order: String,
	pub points: Vec<Point>,
	pub length: f64,
}

/// Up to `keep` shortest Manhattan routes between two points, one per
/// distinct axis ordering. Orderings that collapse to the same polyline
/// (zero deltas) are deduplicated; ties keep axis-order lexicographic
/// precedence.
pub fn manhattan_routes(start: &Point, end: &Point, keep: usize) -> Vec<ManhattanRoute> {
	let delta = [end.x - start.x, end.y - start.y, end.z - start.z];
	let mut seen: Vec<Vec<Point>> = Vec::new();
	let mut out: Vec<ManhattanRoute> = Vec::new();
	for perm in (0..3).permutations(3) {
		let mut cur = *start;
		let mut points = vec![cur];
		let mut length = 0.0;
		let mut order: Vec<char> = Vec::new();
		for &axis in &perm {
			if delta[axis] != 0.0 {
				match axis {
					0 => cur.x += delta[0],
					1 => cur.y += delta[1],
					_ => cur.z += delta[2],
				}
				points.push(cur);
				length += delta[axis].abs();
				order.push(AXES[axis]);
			}
		}
		if seen.contains(&points) {
			continue;
		}
		seen.push(points.clone());
		out.push(ManhattanRoute {
			order: order.iter().join("→"),
			points,
			length,
		});
	}
	// every ordering covers the same deltas, so the sort is a stable no-op
	// that nevertheless honours the contract if lengths ever differ
	out.sort_by_key(|r| n64(r.length));
	out.truncate(keep);
	out
}

/// Connection report emitted to the caller
#[derive(Serialize, Debug)]
pub struct ConnectionReport {
	pub external: Point,
	pub cable: CableType,
	/// Endpoint keys of the nearest edge
	pub edge: (Key, Key),
	/// Projection of the external point onto that edge (the connection point)
	pub projection: Point,
	/// Euclidean gap between the external point and the connection point
	pub euclidean: f64,
	pub routes: Vec<ManhattanRoute>,
	pub edges_considered: usize,
}

/// A computed connection: the report plus the extended graph artifact
pub struct Connection {
	pub report: ConnectionReport,
	pub extended: TaggedGraphFile,
}

/// Project `external` onto the nearest edge admissible for `cable` and
/// produce the extended graph containing the new external node, its
/// Manhattan approach, and the split of the host edge.
pub fn connect(
	graph: &RouteGraph,
	cable: CableType,
	params: &Parameters,
	external: &Point,
) -> Result<Connection, RouteError> {
	let rules = CableRules::from_parameters(params);
	let allowed = rules.allowed_systems(cable)?;
	let view = FilteredView::build(graph, allowed);
	let index = GridIndex::build(graph, &view, params)?;
	let hit = index.nearest_edge(external).ok_or(RouteError::NoEdgeFound)?;
	let edge = graph.edge(hit.edge);
	let (ukey, vkey) = (graph.node(edge.u).key.clone(), graph.node(edge.v).key.clone());
	log::info!(
		"external {} connects to edge {} at {} ({:.3} off, {})",
		external, graph.canonical_edge_key(hit.edge), hit.projection, hit.distance, MatchQuality::of(hit.distance)
	);
	let routes = manhattan_routes(external, &hit.projection, params.keep_routes.max(1));

	let mut extended = graph.to_file();
	// resolve the connection point: an endpoint when the projection snaps
	// onto one, otherwise a new node splitting the host edge
	let connection_key = if hit.projection.dist(&graph.node(edge.u).at) <= params.snap_epsilon {
		ukey.clone()
	} else if hit.projection.dist(&graph.node(edge.v).at) <= params.snap_epsilon {
		vkey.clone()
	} else {
		let pkey = hit.projection.key();
		extended.nodes.insert(pkey.clone(), NodeRec { sys: edge.sys });
		extended.edges.retain(|e| {
			!((e.from == ukey && e.to == vkey) || (e.from == vkey && e.to == ukey))
		});
		extended.edges.push(EdgeRec { from: ukey.clone(), to: pkey.clone(), sys: edge.sys });
		extended.edges.push(EdgeRec { from: pkey.clone(), to: vkey.clone(), sys: edge.sys });
		pkey
	};

	let best = &routes[0];
	if best.points.len() < 2 {
		// the external point already sits on the graph; nothing to attach
		log::warn!("external point {} coincides with its projection, emitting the split only", external);
	} else {
		let ext_key = external.key();
		extended.nodes.insert(ext_key.clone(), NodeRec { sys: SystemTag::Ext });
		// approach corners are external too; approach edges carry the host
		// system so the spur is traversable by the same cables as its edge
		let mut prev = ext_key;
		for corner in &best.points[1..best.points.len() - 1] {
			let ckey = corner.key();
			extended.nodes.insert(ckey.clone(), NodeRec { sys: SystemTag::Ext });
			extended.edges.push(EdgeRec { from: prev, to: ckey.clone(), sys: edge.sys });
			prev = ckey;
		}
		extended.edges.push(EdgeRec { from: prev, to: connection_key, sys: edge.sys });
	}

	Ok(Connection {
		report: ConnectionReport {
			external: *external,
			cable,
			edge: (ukey, vkey),
			projection: hit.projection,
			euclidean: hit.distance,
			routes,
			edges_considered: index_edge_count(&view, graph),
		},
		extended,
	})
}

fn index_edge_count(view: &FilteredView, graph: &RouteGraph) -> usize {
	view.edges(graph).filter(|&e| graph.edge(e).len > 0.0).count()
}
