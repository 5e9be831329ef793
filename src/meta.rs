//! Meta parameters for the routing engine, loadable from YAML

use crate::*;
use serde::*;
use indexmap::{IndexMap, indexmap};

/// Tunables of a routing session.
///
/// Everything has a sensible default; a YAML file may override any subset.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Parameters {
	/// Maximum distance for resolving a query coordinate onto the graph (τ)
	pub tolerance: f64,
	/// Grid cell size override; computed from the graph when absent
	pub grid_size: Option<f64>,
	/// Cap on the shell-expansion radius of spatial queries
	pub max_shell_radius: usize,
	/// A query point farther than `distant_factor` times the largest
	/// bounding-box extent outside the box skips shell expansion and scans
	/// edges brute-force.
	pub distant_factor: f64,
	/// Projections within this distance of an edge endpoint resolve to the
	/// endpoint instead of splitting the edge.
	pub snap_epsilon: f64,
	/// How many Manhattan connection routes the external connector retains
	pub keep_routes: usize,
	/// Cable type → permitted systems. Closed at configuration time.
	pub cables: IndexMap<CableType, Vec<SystemTag>>,
}

impl Default for Parameters {
	fn default() -> Self {
		Self {
			tolerance: 1.0,
			grid_size: None,
			max_shell_radius: 100,
			distant_factor: 2.0,
			snap_epsilon: 1e-6,
			keep_routes: 2,
			cables: indexmap! {
				CableType::A => vec![SystemTag::A],
				CableType::B => vec![SystemTag::B],
				CableType::C => vec![SystemTag::A, SystemTag::B],
			},
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults_cover_all_cables() {
		let p = Parameters::default();
		assert_eq!(p.cables.get(&CableType::A), Some(&vec![SystemTag::A]));
		assert_eq!(p.cables.get(&CableType::B), Some(&vec![SystemTag::B]));
		assert_eq!(p.cables.get(&CableType::C), Some(&vec![SystemTag::A, SystemTag::B]));
	}

	#[test]
	fn partial_yaml_overrides() {
		let p: Parameters = serde_yaml::from_str("tolerance: 0.5\nmax_shell_radius: 10\n").unwrap();
		assert_eq!(p.tolerance, 0.5);
		assert_eq!(p.max_shell_radius, 10);
		assert_eq!(p.distant_factor, 2.0);
		assert_eq!(p.keep_routes, 2);
	}
}
