//! Uniform-cell 3D spatial index over the filtered edge set.
//!
//! Cells map to the edges that touch them; nearest-node and nearest-edge
//! queries expand cube shells outward from the query cell and stop as soon
//! as the best candidate is provably closest. Points far outside the
//! bounding box skip straight to a brute-force scan, where shell expansion
//! is wasteful.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::*;

/// Diagnostic bucket for how closely a query point matched the graph
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MatchQuality {
	Excellent,
	VeryGood,
	Good,
	Poor,
}

impl MatchQuality {
	/// Bucket a match distance
	pub fn of(distance: f64) -> Self {
		if distance <= 0.1 {
			MatchQuality::Excellent
		} else if distance <= 0.5 {
			MatchQuality::VeryGood
		} else if distance <= 1.0 {
			MatchQuality::Good
		} else {
			MatchQuality::Poor
		}
	}
}

impl std::fmt::Display for MatchQuality {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			MatchQuality::Excellent => write!(f, "EXCELLENT"),
			MatchQuality::VeryGood => write!(f, "VERY_GOOD"),
			MatchQuality::Good => write!(f, "GOOD"),
			MatchQuality::Poor => write!(f, "POOR"),
		}
	}
}

/// Closed-form projection of a point onto a segment, with the parameter
/// clamped to `[0, 1]`. Returns `(distance, projection, t)`.
pub fn point_segment(p: &Point, a: &Point, b: &Point) -> (f64, Point, f64) {
	let ab = (b.x - a.x, b.y - a.y, b.z - a.z);
	let ap = (p.x - a.x, p.y - a.y, p.z - a.z);
	let denom = ab.0 * ab.0 + ab.1 * ab.1 + ab.2 * ab.2;
	let t = if denom > 0.0 {
		((ap.0 * ab.0 + ap.1 * ab.1 + ap.2 * ab.2) / denom).max(0.0).min(1.0)
	} else {
		0.0
	};
	let proj = Point::new(a.x + t * ab.0, a.y + t * ab.1, a.z + t * ab.2);
	(p.dist(&proj), proj, t)
}

#[derive(Clone, Copy, Debug)]
pub struct BoundingBox {
	pub min: [f64; 3],
	pub max: [f64; 3],
}

impl BoundingBox {
	fn around<'a>(points: impl Iterator<Item = &'a Point>) -> Self {
		let mut min = [f64::INFINITY; 3];
		let mut max = [f64::NEG_INFINITY; 3];
		for p in points {
			for i in 0..3 {
				min[i] = min[i].min(p.axis(i));
				max[i] = max[i].max(p.axis(i));
			}
		}
		Self { min, max }
	}
	pub fn size(&self) -> [f64; 3] {
		[self.max[0] - self.min[0], self.max[1] - self.min[1], self.max[2] - self.min[2]]
	}
	pub fn max_extent(&self) -> f64 {
		let s = self.size();
		s[0].max(s[1]).max(s[2])
	}
	/// Distance from a point to the box (0 inside)
	pub fn outside_distance(&self, p: &Point) -> f64 {
		let mut acc = 0.0;
		for i in 0..3 {
			let c = p.axis(i);
			if c < self.min[i] {
				acc += (self.min[i] - c) * (self.min[i] - c);
			} else if c > self.max[i] {
				acc += (c - self.max[i]) * (c - self.max[i]);
			}
		}
		acc.sqrt()
	}
}

type Cell = (i64, i64, i64);

/// Result of a nearest-edge query
#[derive(Clone, Copy, Debug)]
pub struct EdgeHit {
	pub edge: EdgeIdx,
	pub distance: f64,
	pub projection: Point,
	pub t: f64,
}

pub struct GridIndex<'g> {
	graph: &'g RouteGraph,
	/// admissible, non-degenerate edges
	edges: Vec<EdgeIdx>,
	cells: HashMap<Cell, Vec<usize>>,
	pub cell_size: f64,
	pub bbox: BoundingBox,
	max_shell_radius: usize,
	distant_factor: f64,
}

impl<'g> GridIndex<'g> {
	/// Index the admissible edges of `view`. Zero-length edges are skipped;
	/// an edgeless view fails with `NoEdgeFound`, a view of only
	/// zero-length edges with `ProjectionDegenerate`.
	pub fn build(graph: &'g RouteGraph, view: &FilteredView, params: &Parameters) -> Result<Self, RouteError> {
		let all: Vec<EdgeIdx> = view.edges(graph).collect();
		if all.is_empty() {
			return Err(RouteError::NoEdgeFound);
		}
		let edges: Vec<EdgeIdx> = all.into_iter().filter(|&e| graph.edge(e).len > 0.0).collect();
		if edges.is_empty() {
			return Err(RouteError::ProjectionDegenerate);
		}
		let endpoints: HashSet<NodeIdx> = edges.iter()
			.flat_map(|&e| {
				let edge = graph.edge(e);
				[edge.u, edge.v]
			})
			.collect();
		let bbox = BoundingBox::around(endpoints.iter().map(|&n| &graph.node(n).at));
		let cell_size = params.grid_size.unwrap_or_else(|| Self::optimal_cell_size(graph, &edges, endpoints.len(), &bbox));
		let mut cells: HashMap<Cell, Vec<usize>> = HashMap::new();
		for (i, &e) in edges.iter().enumerate() {
			let edge = graph.edge(e);
			for c in Self::cells_of_segment(cell_size, &graph.node(edge.u).at, &graph.node(edge.v).at) {
				cells.entry(c).or_default().push(i);
			}
		}
		let index = Self {
			graph,
			edges,
			cells,
			cell_size,
			bbox,
			max_shell_radius: params.max_shell_radius,
			distant_factor: params.distant_factor,
		};
		index.analyze();
		Ok(index)
	}

	/// `min(avg_cubic, 2·avg_edge_length)`: balances per-cell occupancy
	/// against shell-search radius.
	fn optimal_cell_size(graph: &RouteGraph, edges: &[EdgeIdx], node_count: usize, bbox: &BoundingBox) -> f64 {
		let size = bbox.size();
		let vol = size[0] * size[1] * size[2];
		let avg_cubic = if node_count > 0 { (vol / node_count as f64).powf(1.0 / 3.0) } else { 0.0 };
		let avg_edge = edges.iter().map(|&e| graph.edge(e).len).sum::<f64>() / edges.len() as f64;
		let candidates = [avg_cubic, avg_edge * 2.0];
		let cell = candidates.iter().copied().filter(|c| *c > 0.0).fold(f64::INFINITY, f64::min);
		if cell.is_finite() {
			cell
		} else {
			1.0
		}
	}

	fn cell_of(cell_size: f64, p: &Point) -> Cell {
		(
			(p.x / cell_size).floor() as i64,
			(p.y / cell_size).floor() as i64,
			(p.z / cell_size).floor() as i64,
		)
	}

	/// Cells a segment passes through, walked in max-axis steps
	fn cells_of_segment(cell_size: f64, a: &Point, b: &Point) -> HashSet<Cell> {
		let c0 = Self::cell_of(cell_size, a);
		let c1 = Self::cell_of(cell_size, b);
		let mut cells = HashSet::new();
		if c0 == c1 {
			cells.insert(c0);
			return cells;
		}
		let steps = (c1.0 - c0.0).abs().max((c1.1 - c0.1).abs()).max((c1.2 - c0.2).abs());
		let inc = (
			(b.x - a.x) / steps as f64,
			(b.y - a.y) / steps as f64,
			(b.z - a.z) / steps as f64,
		);
		let (mut x, mut y, mut z) = (a.x, a.y, a.z);
		for _ in 0..=steps {
			cells.insert(Self::cell_of(cell_size, &Point::new(x, y, z)));
			x += inc.0;
			y += inc.1;
			z += inc.2;
		}
		cells.insert(c1);
		cells
	}

	fn shell_cells(centre: Cell, r: i64) -> Vec<Cell> {
		if r == 0 {
			return vec![centre];
		}
		let mut cells = Vec::new();
		for dx in -r..=r {
			for dy in -r..=r {
				for dz in -r..=r {
					if dx.abs().max(dy.abs()).max(dz.abs()) == r {
						cells.push((centre.0 + dx, centre.1 + dy, centre.2 + dz));
					}
				}
			}
		}
		cells
	}

	fn is_very_distant(&self, p: &Point) -> bool {
		let extent = self.bbox.max_extent();
		let extent = if extent > 0.0 { extent } else { 1.0 };
		self.bbox.outside_distance(p) > self.distant_factor * extent
	}

	/// Nearest indexed edge to a point, with projection.
	///
	/// Shell expansion terminates early once the best distance is at most
	/// `0.5·cell_size·(r+1)`, which no unvisited shell can beat.
	pub fn nearest_edge(&self, p: &Point) -> Option<EdgeHit> {
		if self.is_very_distant(p) {
			log::debug!("point {} is far outside the bounding box, scanning edges brute-force", p);
			return self.brute_force_edge(p);
		}
		let centre = Self::cell_of(self.cell_size, p);
		let mut best: Option<EdgeHit> = None;
		let mut seen: HashSet<usize> = HashSet::new();
		for r in 0..=self.max_shell_radius as i64 {
			for c in Self::shell_cells(centre, r) {
				if let Some(ids) = self.cells.get(&c) {
					for &i in ids {
						if !seen.insert(i) {
							continue;
						}
						let e = self.edges[i];
						let edge = self.graph.edge(e);
						let (d, proj, t) = point_segment(p, &self.graph.node(edge.u).at, &self.graph.node(edge.v).at);
						if best.map_or(true, |b| d < b.distance) {
							best = Some(EdgeHit { edge: e, distance: d, projection: proj, t });
						}
					}
				}
			}
			if let Some(b) = best {
				if b.distance <= 0.5 * self.cell_size * (r + 1) as f64 {
					return Some(b);
				}
			}
		}
		if best.is_none() {
			log::debug!("shell search exhausted at radius {}, falling back to brute force", self.max_shell_radius);
			return self.brute_force_edge(p);
		}
		best
	}

	fn brute_force_edge(&self, p: &Point) -> Option<EdgeHit> {
		let mut best: Option<EdgeHit> = None;
		for &e in &self.edges {
			let edge = self.graph.edge(e);
			let (d, proj, t) = point_segment(p, &self.graph.node(edge.u).at, &self.graph.node(edge.v).at);
			if best.map_or(true, |b| d < b.distance) {
				best = Some(EdgeHit { edge: e, distance: d, projection: proj, t });
			}
		}
		best
	}

	/// Nearest graph node (an endpoint of an indexed edge) to a point
	pub fn nearest_node(&self, p: &Point) -> Option<(NodeIdx, f64)> {
		if self.is_very_distant(p) {
			return self.brute_force_node(p);
		}
		let centre = Self::cell_of(self.cell_size, p);
		let mut best: Option<(NodeIdx, f64)> = None;
		let mut seen: HashSet<NodeIdx> = HashSet::new();
		for r in 0..=self.max_shell_radius as i64 {
			for c in Self::shell_cells(centre, r) {
				if let Some(ids) = self.cells.get(&c) {
					for &i in ids {
						let edge = self.graph.edge(self.edges[i]);
						for n in [edge.u, edge.v] {
							if !seen.insert(n) {
								continue;
							}
							let d = p.dist(&self.graph.node(n).at);
							if best.map_or(true, |(_, bd)| d < bd) {
								best = Some((n, d));
							}
						}
					}
				}
			}
			if let Some((_, bd)) = best {
				if bd <= 0.5 * self.cell_size * (r + 1) as f64 {
					return best;
				}
			}
		}
		if best.is_none() {
			return self.brute_force_node(p);
		}
		best
	}

	fn brute_force_node(&self, p: &Point) -> Option<(NodeIdx, f64)> {
		let mut best: Option<(NodeIdx, f64)> = None;
		let mut seen: HashSet<NodeIdx> = HashSet::new();
		for &e in &self.edges {
			let edge = self.graph.edge(e);
			for n in [edge.u, edge.v] {
				if !seen.insert(n) {
					continue;
				}
				let d = p.dist(&self.graph.node(n).at);
				if best.map_or(true, |(_, bd)| d < bd) {
					best = Some((n, d));
				}
			}
		}
		best
	}

	/// Nearest node constrained to the matching tolerance, with quality
	pub fn nearest_node_within(&self, p: &Point, tolerance: f64) -> Result<(NodeIdx, f64, MatchQuality), RouteError> {
		match self.nearest_node(p) {
			Some((n, d)) if d <= tolerance => Ok((n, d, MatchQuality::of(d))),
			_ => Err(RouteError::NoNearestNode { point: *p, tolerance }),
		}
	}

	fn analyze(&self) {
		if !log::log_enabled!(log::Level::Debug) {
			return;
		}
		log::debug!("spatial index: {} edges across {} cells, cell size {:.3}", self.edges.len(), self.cells.len(), self.cell_size);
		if let itertools::MinMaxResult::MinMax(lo, hi) = self.cells.values().map(Vec::len).minmax() {
			let total: usize = self.cells.values().map(Vec::len).sum();
			log::debug!("cell occupancy: min {} max {} avg {:.1}", lo, hi, total as f64 / self.cells.len() as f64);
		}
	}
}
