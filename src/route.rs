//! Multi-leg route composition and the public routing operations.
//!
//! A request filters the graph by cable, builds the spatial index, resolves
//! every waypoint (splitting edges into a per-request overlay where needed),
//! then chains one A* search per leg. Legs run strictly sequentially; the
//! only mutation anywhere is the overlay and the per-leg forbidden delta,
//! both owned by the request.

use std::collections::HashSet;

use serde::Serialize;

use crate::*;

/// One routing session over a loaded graph: cable filter, spatial index and
/// forbidden set are fixed; each operation owns its own overlay.
pub struct Router<'g> {
	graph: &'g RouteGraph,
	params: &'g Parameters,
	cable: CableType,
	allowed: SystemSet,
	view: FilteredView,
	index: GridIndex<'g>,
	forbidden: HashSet<TramoId>,
}

impl<'g> Router<'g> {
	pub fn new(
		graph: &'g RouteGraph,
		cable: CableType,
		forbidden: &[TramoId],
		params: &'g Parameters,
	) -> Result<Self, RouteError> {
		let rules = CableRules::from_parameters(params);
		let allowed = rules.allowed_systems(cable)?;
		if !forbidden.is_empty() && !graph.has_tramo_ids() {
			return Err(RouteError::MalformedGraph(
				"forbidden sections supplied but the graph has no tramo map".to_string(),
			));
		}
		let view = FilteredView::build(graph, allowed.clone());
		let index = GridIndex::build(graph, &view, params)?;
		log::info!("router ready: cable {} (systems {}), {} forbidden section(s)", cable, allowed, forbidden.len());
		Ok(Self {
			graph,
			params,
			cable,
			allowed,
			view,
			index,
			forbidden: forbidden.iter().copied().collect(),
		})
	}

	pub fn allowed_systems(&self) -> &SystemSet {
		&self.allowed
	}

	/// Shortest route origin → destination
	pub fn direct(&self, origin: &Point, destination: &Point, cancel: Option<&CancelToken>) -> Result<RouteResult, RouteError> {
		self.compose(&[*origin, *destination], false, cancel)
	}

	/// Route origin → PPO → destination
	pub fn ppo(&self, origin: &Point, ppo: &Point, destination: &Point, cancel: Option<&CancelToken>) -> Result<RouteResult, RouteError> {
		self.compose(&[*origin, *ppo, *destination], false, cancel)
	}

	/// Route visiting every PPO in order. An empty list degenerates to
	/// [`Router::direct`].
	pub fn multi_ppo(&self, origin: &Point, ppos: &[Point], destination: &Point, cancel: Option<&CancelToken>) -> Result<RouteResult, RouteError> {
		let mut waypoints = Vec::with_capacity(ppos.len() + 2);
		waypoints.push(*origin);
		waypoints.extend_from_slice(ppos);
		waypoints.push(*destination);
		self.compose(&waypoints, false, cancel)
	}

	/// Like [`Router::multi_ppo`], but leg i may not start on the edge leg
	/// i-1 ended on (anti-backtracking on the join edge only).
	pub fn forward_path(&self, origin: &Point, ppos: &[Point], destination: &Point, cancel: Option<&CancelToken>) -> Result<RouteResult, RouteError> {
		let mut waypoints = Vec::with_capacity(ppos.len() + 2);
		waypoints.push(*origin);
		waypoints.extend_from_slice(ppos);
		waypoints.push(*destination);
		self.compose(&waypoints, true, cancel)
	}

	/// Run both orderings of two PPOs and report the winner
	pub fn optimal_check(
		&self,
		origin: &Point,
		ppo1: &Point,
		ppo2: &Point,
		destination: &Point,
		cancel: Option<&CancelToken>,
	) -> Result<OptimalCheckReport, RouteError> {
		let run = |first: &Point, second: &Point| -> OrderReport {
			let sequence = vec![*origin, *first, *second, *destination];
			match self.multi_ppo(origin, &[*first, *second], destination, cancel) {
				Ok(result) => OrderReport { sequence, result: Some(result), error: None },
				Err(e) => {
					log::info!("ordering {:?} failed: {}", [first, second], e);
					OrderReport { sequence, result: None, error: Some(e.to_string()) }
				}
			}
		};
		let order1 = run(ppo1, ppo2);
		let order2 = run(ppo2, ppo1);
		let report = OptimalCheckReport::judge(order1, order2);
		log::info!("optimal check: {:?}", report.winner);
		Ok(report)
	}

	/// Resolve waypoints and chain one search per leg
	fn compose(&self, waypoints: &[Point], forward: bool, cancel: Option<&CancelToken>) -> Result<RouteResult, RouteError> {
		debug_assert!(waypoints.len() >= 2);
		let legs_total = waypoints.len() - 1;
		// endpoints and PPOs that name graph nodes must sit in a permitted
		// system before any search runs
		for p in waypoints {
			if self.graph.node_by_key(&p.key()).is_some() {
				validate_endpoint(self.graph, &p.key(), self.cable, &self.allowed)?;
			}
		}
		let mut overlay = Overlay::new(self.graph);
		let mut refs: Vec<NodeRef> = Vec::new();
		for p in waypoints {
			refs.push(resolve_point(&mut overlay, &self.index, self.params, p)?);
		}

		if forward && !self.graph.has_tramo_ids() {
			log::warn!("forward-path requested without a tramo map; the join-edge rule is inert");
		}

		let mut points: Vec<Point> = Vec::new();
		let mut legs: Vec<LegInfo> = Vec::new();
		let mut total_explored = 0usize;
		let mut total_distance = 0.0f64;
		let mut last_edge_tramo: Option<TramoId> = None;

		for (leg, pair) in refs.windows(2).enumerate() {
			let extra = if forward && leg > 0 { last_edge_tramo } else { None };
			if let Some(id) = extra {
				log::debug!("leg {}: forward path forbids tramo {}", leg + 1, id);
			}
			let pred = EdgePredicate { view: &self.view, forbidden: &self.forbidden, extra_forbidden: extra };
			let outcome = match astar(&overlay, pair[0], pair[1], &pred, cancel) {
				Ok(o) => o,
				Err(RouteError::Cancelled) => return Err(RouteError::Cancelled),
				Err(RouteError::NoPath { .. }) if extra.is_some() => {
					return Err(RouteError::ForwardPathInfeasible { leg, tramo: extra.unwrap() });
				}
				Err(cause) if legs_total == 1 => return Err(cause),
				Err(cause) => {
					let cause = match cause {
						RouteError::NoPath { .. } => RouteError::NoPath { leg: Some(leg) },
						other => other,
					};
					return Err(RouteError::LegFailed { leg, cause: Box::new(cause) });
				}
			};
			log::debug!(
				"leg {}: {} points, {:.3} units, {} nodes explored",
				leg + 1, outcome.path.len(), outcome.distance, outcome.explored
			);
			last_edge_tramo = outcome.edges.last().and_then(|&e| self.graph.edge(e).tramo);
			let leg_points: Vec<Point> = outcome.path.iter().map(|&n| overlay.point_of(n)).collect();
			legs.push(LegInfo {
				from: *leg_points.first().expect("leg path is never empty"),
				to: *leg_points.last().expect("leg path is never empty"),
				points_count: leg_points.len(),
				nodes_explored: outcome.explored,
				distance: outcome.distance,
			});
			total_explored += outcome.explored;
			total_distance += outcome.distance;
			// suppress the duplicated join point between legs
			let skip = if points.last() == leg_points.first() { 1 } else { 0 };
			points.extend(leg_points.into_iter().skip(skip));
		}

		Ok(RouteResult {
			points,
			total_distance,
			nodes_explored: total_explored,
			legs,
			meta: RouteMeta {
				cable: self.cable,
				allowed_systems: self.allowed.tags().to_vec(),
				forbidden_count: self.forbidden.len(),
			},
		})
	}
}

/// Outcome of one PPO ordering inside an optimal check
#[derive(Serialize, Debug)]
pub struct OrderReport {
	pub sequence: Vec<Point>,
	pub result: Option<RouteResult>,
	pub error: Option<String>,
}

impl OrderReport {
	pub fn distance(&self) -> Option<f64> {
		self.result.as_ref().map(|r| r.total_distance)
	}
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
	First,
	Second,
	Tie,
	Neither,
}

/// Distances within this much of each other count as a tie
const TIE_EPSILON: f64 = 1e-6;

#[derive(Serialize, Debug)]
pub struct OptimalCheckReport {
	pub order1: OrderReport,
	pub order2: OrderReport,
	pub winner: Winner,
	/// Distance saved by the winning ordering, when both succeeded
	pub improvement: Option<f64>,
}

impl OptimalCheckReport {
	fn judge(order1: OrderReport, order2: OrderReport) -> Self {
		let (winner, improvement) = match (order1.distance(), order2.distance()) {
			(None, None) => (Winner::Neither, None),
			(Some(_), None) => (Winner::First, None),
			(None, Some(_)) => (Winner::Second, None),
			(Some(d1), Some(d2)) => {
				if (d1 - d2).abs() <= TIE_EPSILON {
					(Winner::Tie, None)
				} else if d1 < d2 {
					(Winner::First, Some(d2 - d1))
				} else {
					(Winner::Second, Some(d1 - d2))
				}
			}
		};
		Self { order1, order2, winner, improvement }
	}
}
