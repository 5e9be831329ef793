//! Error kinds a routing request can surface.
//!
//! All errors bubble to the orchestrator verbatim; there is no silent
//! recovery and the composer never retries with relaxed constraints. The CLI
//! maps each kind to an exit code and a single-line diagnostic, the library
//! form hands the structured value back for inspection.

use crate::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteError {
	/// Missing tags, dangling edge endpoints, duplicate tramo IDs, or a
	/// tramo map that disagrees with the edge set.
	#[error("malformed graph: {0}")]
	MalformedGraph(String),
	#[error("unknown cable type {0:?}")]
	UnknownCable(String),
	#[error("endpoint {key} lies in system {sys}, not permitted for cable {cable}")]
	EndpointInForbiddenSystem { key: Key, sys: SystemTag, cable: CableType },
	#[error("node {0} not present in graph")]
	UnknownNode(Key),
	#[error("no graph node within tolerance {tolerance} of {point}")]
	NoNearestNode { point: Point, tolerance: f64 },
	#[error("point {point} is not on the graph (nearest edge at {nearest_distance:.3}, match quality {quality})")]
	PointNotOnGraph { point: Point, nearest_distance: f64, quality: MatchQuality },
	#[error("endpoint {0} not present in the search graph")]
	UnknownEndpoint(Key),
	#[error("no admissible route{}", .leg.map(|i| format!(" on leg {}", i + 1)).unwrap_or_default())]
	NoPath { leg: Option<usize> },
	#[error("forward-path rule left leg {} without a route (blocking tramo {tramo})", .leg + 1)]
	ForwardPathInfeasible { leg: usize, tramo: TramoId },
	#[error("leg {} failed: {cause}", .leg + 1)]
	LegFailed {
		leg: usize,
		#[source]
		cause: Box<RouteError>,
	},
	#[error("search cancelled")]
	Cancelled,
	/// The graph carries no (admissible) edges to connect to.
	#[error("no edge found")]
	NoEdgeFound,
	/// Every candidate edge was zero-length.
	#[error("projection degenerate: only zero-length edges available")]
	ProjectionDegenerate,
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),
	#[error("invalid parameters file: {0}")]
	Yaml(#[from] serde_yaml::Error),
}

impl RouteError {
	/// Stable process exit code of this error kind
	pub fn exit_code(&self) -> i32 {
		use RouteError::*;
		match self {
			MalformedGraph(_) => 2,
			UnknownCable(_) => 3,
			EndpointInForbiddenSystem { .. } => 4,
			UnknownNode(_) | UnknownEndpoint(_) => 5,
			NoNearestNode { .. } | PointNotOnGraph { .. } => 6,
			NoPath { .. } => 7,
			ForwardPathInfeasible { .. } => 8,
			LegFailed { cause, .. } => cause.exit_code(),
			Cancelled => 9,
			NoEdgeFound | ProjectionDegenerate => 10,
			Io(_) | Json(_) | Yaml(_) => 1,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn leg_failed_inherits_inner_exit_code() {
		let e = RouteError::LegFailed {
			leg: 1,
			cause: Box::new(RouteError::NoPath { leg: Some(1) }),
		};
		assert_eq!(e.exit_code(), 7);
		assert_eq!(e.to_string(), "leg 2 failed: no admissible route on leg 2");
	}

	#[test]
	fn no_path_display_with_and_without_leg() {
		assert_eq!(RouteError::NoPath { leg: None }.to_string(), "no admissible route");
		assert_eq!(RouteError::NoPath { leg: Some(0) }.to_string(), "no admissible route on leg 1");
	}
}
