//! A* search over the overlaid graph.
//!
//! The engine never materialises a pruned graph: admissibility is a
//! predicate consulted on neighbour expansion, so per-leg forbidden-set
//! changes stay O(1).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use priority_queue::PriorityQueue;

use crate::*;

/// Cooperative cancellation flag, checked at each open-set pop
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}
	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}
	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// Edge admissibility for one leg: cable-filtered view ∧ ¬forbidden set
/// ∧ ¬per-leg forward-path addition
#[derive(Clone, Copy)]
pub struct EdgePredicate<'a> {
	pub view: &'a FilteredView,
	pub forbidden: &'a HashSet<TramoId>,
	/// Forward-path rule: the previous leg's final edge, forbidden for this
	/// leg only
	pub extra_forbidden: Option<TramoId>,
}

impl<'a> EdgePredicate<'a> {
	pub fn admits(&self, graph: &RouteGraph, e: EdgeIdx) -> bool {
		if !self.view.edge_admissible(e) {
			return false;
		}
		if let Some(id) = graph.edge(e).tramo {
			if self.forbidden.contains(&id) || self.extra_forbidden == Some(id) {
				return false;
			}
		}
		true
	}
}

/// A successful search: visited refs, traversed base edges, exact cost, and
/// the number of open-set pops.
pub struct SearchOutcome {
	pub path: Vec<NodeRef>,
	pub edges: Vec<EdgeIdx>,
	pub distance: f64,
	pub explored: usize,
}

/// Weighted shortest path with the Euclidean heuristic (admissible and
/// consistent, so the first pop of the goal is optimal).
pub fn astar(
	overlay: &Overlay<'_>,
	start: NodeRef,
	goal: NodeRef,
	pred: &EdgePredicate<'_>,
	cancel: Option<&CancelToken>,
) -> Result<SearchOutcome, RouteError> {
	let graph = overlay.graph();
	for &n in &[start, goal] {
		if let NodeRef::Base(i) = n {
			if !pred.view.node_admissible(i) {
				return Err(RouteError::UnknownEndpoint(graph.node(i).key.clone()));
			}
		}
	}
	let goal_at = overlay.point_of(goal);
	let h = |n: NodeRef| n64(overlay.point_of(n).dist(&goal_at));

	let mut dp: HashMap<NodeRef, (N64, Option<(NodeRef, EdgeIdx)>)> = HashMap::new();
	let mut closed: HashSet<NodeRef> = HashSet::new();
	let mut q = PriorityQueue::new();
	dp.insert(start, (n64(0.0), None));
	q.push(start, -h(start));
	let mut explored = 0usize;

	while let Some((u, _)) = q.pop() {
		if cancel.map_or(false, CancelToken::is_cancelled) {
			log::debug!("search cancelled after {} pops", explored);
			return Err(RouteError::Cancelled);
		}
		if !closed.insert(u) {
			continue;
		}
		explored += 1;
		if u == goal {
			let mut path = vec![u];
			let mut edges = Vec::new();
			let mut v = u;
			while let Some((_, Some((prev, e)))) = dp.get(&v) {
				edges.push(*e);
				v = *prev;
				path.push(v);
			}
			path.reverse();
			edges.reverse();
			let distance = dp[&goal].0.raw();
			log::trace!("path found: {} points, {:.3} units, {} pops", path.len(), distance, explored);
			return Ok(SearchOutcome { path, edges, distance, explored });
		}
		let gu = dp[&u].0;
		for (v, e, len) in overlay.neighbours(u) {
			if closed.contains(&v) || !pred.admits(graph, e) {
				continue;
			}
			let gv = gu + n64(len);
			if dp.get(&v).map_or(true, |(old, _)| *old > gv) {
				dp.insert(v, (gv, Some((u, e))));
				q.push(v, -(gv + h(v)));
			}
		}
	}
	log::trace!("open set exhausted after {} pops", explored);
	Err(RouteError::NoPath { leg: None })
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::graph::test::{tagged, tramos_for};
	use pretty_assertions::assert_eq;

	/// A 4-cycle with two equal-length routes corner to corner:
	///
	/// (0,0) - (4,0) - (4,3), plus (0,0) - (0,3) - (4,3)
	fn diamond() -> (RouteGraph, Parameters) {
		let file = tagged! {
			nodes: [("(0, 0, 0)", A), ("(4, 0, 0)", A), ("(4, 3, 0)", A), ("(0, 3, 0)", A)],
			edges: [
				("(0, 0, 0)", "(4, 0, 0)", A),
				("(4, 0, 0)", "(4, 3, 0)", A),
				("(0, 0, 0)", "(0, 3, 0)", A),
				("(0, 3, 0)", "(4, 3, 0)", A),
			]
		};
		let map = tramos_for(&file);
		(RouteGraph::build(&file, Some(&map)).unwrap(), Parameters::default())
	}

	fn search(g: &RouteGraph, forbidden: &HashSet<TramoId>, extra: Option<TramoId>, from: &str, to: &str) -> Result<SearchOutcome, RouteError> {
		let rules = CableRules::from_parameters(&Parameters::default());
		let view = FilteredView::build(g, rules.allowed_systems(CableType::A).unwrap());
		let overlay = Overlay::new(g);
		let pred = EdgePredicate { view: &view, forbidden, extra_forbidden: extra };
		astar(
			&overlay,
			NodeRef::Base(g.require_node(from)?),
			NodeRef::Base(g.require_node(to)?),
			&pred,
			None,
		)
	}

	#[test]
	fn shortest_of_two_routes() {
		let (g, _) = diamond();
		let out = search(&g, &HashSet::new(), None, "(0, 0, 0)", "(4, 3, 0)").unwrap();
		// bottom-right: 4 + 3 = 7, top-left: 3 + 4 = 7, either is optimal
		assert_eq!(out.distance, 7.0);
		assert_eq!(out.path.len(), 3);
		assert_eq!(out.edges.len(), 2);
		assert!(out.explored >= 3);
	}

	#[test]
	fn forbidden_set_reroutes() {
		let (g, _) = diamond();
		// forbid both bottom edges: the only route left is over the top
		let forbidden: HashSet<TramoId> = [1, 2].iter().copied().collect();
		let out = search(&g, &forbidden, None, "(0, 0, 0)", "(4, 3, 0)").unwrap();
		assert_eq!(out.distance, 7.0);
		assert_eq!(
			out.edges.iter().map(|&e| g.edge(e).tramo.unwrap()).collect::<Vec<_>>(),
			vec![3, 4]
		);
	}

	#[test]
	fn fully_blocked_is_no_path() {
		let (g, _) = diamond();
		let forbidden: HashSet<TramoId> = [1, 3].iter().copied().collect();
		assert!(matches!(
			search(&g, &forbidden, None, "(0, 0, 0)", "(4, 3, 0)"),
			Err(RouteError::NoPath { .. })
		));
	}

	#[test]
	fn extra_forbidden_applies_on_top() {
		let (g, _) = diamond();
		let forbidden: HashSet<TramoId> = [1].iter().copied().collect();
		let out = search(&g, &forbidden, Some(3), "(0, 0, 0)", "(4, 3, 0)");
		assert!(matches!(out, Err(RouteError::NoPath { .. })));
	}

	#[test]
	fn start_equals_goal() {
		let (g, _) = diamond();
		let out = search(&g, &HashSet::new(), None, "(0, 0, 0)", "(0, 0, 0)").unwrap();
		assert_eq!(out.distance, 0.0);
		assert_eq!(out.path.len(), 1);
		assert!(out.edges.is_empty());
		assert_eq!(out.explored, 1);
	}

	#[test]
	fn cancellation_interrupts() {
		let (g, _) = diamond();
		let rules = CableRules::from_parameters(&Parameters::default());
		let view = FilteredView::build(&g, rules.allowed_systems(CableType::A).unwrap());
		let overlay = Overlay::new(&g);
		let pred = EdgePredicate { view: &view, forbidden: &HashSet::new(), extra_forbidden: None };
		let token = CancelToken::new();
		token.cancel();
		let out = astar(
			&overlay,
			NodeRef::Base(g.require_node("(0, 0, 0)").unwrap()),
			NodeRef::Base(g.require_node("(4, 3, 0)").unwrap()),
			&pred,
			Some(&token),
		);
		assert!(matches!(out, Err(RouteError::Cancelled)));
	}
}
