//! # _route 'em cables_
//!
//! CLI for computing constrained shortest 3D cable routes over tagged
//! cable-run graphs: direct, mandatory-waypoint (PPO), forward-path and
//! optimal-check searches, plus an external point connector.

use clap::{App, Arg, ArgMatches, SubCommand, crate_version};

mod astar;
mod connector;
mod data;
mod errors;
mod filter;
mod graph;
mod meta;
mod resolve;
mod route;
mod spatial;

pub use astar::*;
pub use connector::*;
pub use data::*;
pub use errors::*;
pub use filter::*;
pub use graph::*;
pub use meta::*;
pub use resolve::*;
pub use route::*;
pub use spatial::*;
pub use noisy_float::prelude::{n64, Float, N64};
pub use try_all::{TryAll, TryMapAll};

fn coord_validator(s: String) -> Result<(), String> {
	s.parse::<f64>().map(|_| ()).map_err(|e| e.to_string())
}

fn graph_arg<'a, 'b>() -> Arg<'a, 'b> {
	Arg::with_name("graph")
		.takes_value(true)
		.required(true)
		.index(1)
		.help("Tagged graph JSON")
}

fn coords_arg<'a, 'b>(count: u64, help: &'a str) -> Arg<'a, 'b> {
	Arg::with_name("coords")
		.takes_value(true)
		.required(true)
		.multiple(true)
		.number_of_values(count)
		.validator(coord_validator)
		.help(help)
}

fn common_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
	vec![
		Arg::with_name("cable")
			.long("cable")
			.takes_value(true)
			.required(true)
			.possible_values(&["A", "B", "C"])
			.help("Cable type selecting the permitted systems"),
		Arg::with_name("tramo-map")
			.long("tramo-map")
			.takes_value(true)
			.help("Edge → tramo ID mapping JSON"),
		Arg::with_name("forbidden")
			.long("forbidden")
			.takes_value(true)
			.help("Forbidden tramo IDs JSON"),
		Arg::with_name("params")
			.long("params")
			.takes_value(true)
			.help("Engine parameters YAML"),
		Arg::with_name("legacy")
			.long("legacy")
			.takes_value(false)
			.help("Graph file is the legacy untagged adjacency format"),
		Arg::with_name("output")
			.long("output")
			.takes_value(true)
			.help("Write the result JSON here instead of stdout"),
	]
}

fn ppo_arg<'a, 'b>() -> Arg<'a, 'b> {
	Arg::with_name("ppo")
		.long("ppo")
		.takes_value(true)
		.multiple(true)
		.number_of_values(3)
		.validator(coord_validator)
		.help("Mandatory waypoint X Y Z (repeatable, visited in order)")
}

fn main() {
	env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));
	let matches = App::new("Cable Route Compute")
		.version(crate_version!())
		.about("Constrained shortest 3D routes for cables over tagged cable-run graphs")
		.subcommand(
			SubCommand::with_name("direct")
				.about("Shortest route origin → destination")
				.arg(graph_arg())
				.arg(coords_arg(6, "x1 y1 z1 x2 y2 z2"))
				.args(&common_args()),
		)
		.subcommand(
			SubCommand::with_name("ppo")
				.about("Route origin → PPO → destination")
				.arg(graph_arg())
				.arg(coords_arg(9, "x1 y1 z1 x_ppo y_ppo z_ppo x2 y2 z2"))
				.args(&common_args()),
		)
		.subcommand(
			SubCommand::with_name("multi_ppo")
				.about("Route visiting every --ppo in order")
				.arg(graph_arg())
				.arg(coords_arg(6, "x1 y1 z1 x2 y2 z2"))
				.arg(ppo_arg())
				.args(&common_args()),
		)
		.subcommand(
			SubCommand::with_name("forward_path")
				.about("Like multi_ppo, but a leg may not start on the edge the previous leg ended on")
				.arg(graph_arg())
				.arg(coords_arg(6, "x1 y1 z1 x2 y2 z2"))
				.arg(ppo_arg())
				.args(&common_args()),
		)
		.subcommand(
			SubCommand::with_name("optimal_check")
				.about("Compare both orderings of two PPOs")
				.arg(graph_arg())
				.arg(coords_arg(12, "x1 y1 z1 xp1 yp1 zp1 xp2 yp2 zp2 x2 y2 z2"))
				.args(&common_args()),
		)
		.subcommand(
			SubCommand::with_name("tramo_map")
				.about("Generate a tramo ID map covering every edge of a tagged graph")
				.arg(graph_arg())
				.arg(
					Arg::with_name("legacy")
						.long("legacy")
						.takes_value(false)
						.help("Graph file is the legacy untagged adjacency format"),
				)
				.arg(
					Arg::with_name("output")
						.long("output")
						.takes_value(true)
						.help("Write the map JSON here instead of stdout"),
				),
		)
		.subcommand(
			SubCommand::with_name("connect")
				.about("Attach an external point to the network via the nearest edge")
				.arg(graph_arg())
				.arg(coords_arg(3, "x y z of the external point"))
				.args(&common_args())
				.arg(
					Arg::with_name("extended")
						.long("extended")
						.takes_value(true)
						.help("Write the extended graph JSON here"),
				),
		)
		.get_matches();

	if let Err(e) = run(&matches) {
		eprintln!("error: {}", e);
		std::process::exit(e.exit_code());
	}
}

fn run(matches: &ArgMatches<'_>) -> Result<(), RouteError> {
	let (name, sub) = matches.subcommand();
	let sub = match sub {
		Some(sub) => sub,
		None => {
			eprintln!("{}", matches.usage());
			return Ok(());
		}
	};
	let params = load_params(sub.value_of("params"))?;
	let file = load_graph(sub.value_of("graph").unwrap(), sub.is_present("legacy"))?;
	if name == "tramo_map" {
		let map = generate_tramo_map(&file);
		log::info!("generated {} tramo ID mapping(s)", map.len());
		return emit(sub, &map);
	}
	let tramo_map = match sub.value_of("tramo-map") {
		Some(path) => Some(load_json::<TramoMapFile>(path)?),
		None => None,
	};
	let forbidden: ForbiddenFile = match sub.value_of("forbidden") {
		Some(path) => load_json(path)?,
		None => Vec::new(),
	};
	let graph = RouteGraph::build(&file, tramo_map.as_ref())?;
	log::info!("loaded graph: {} nodes, {} edges", graph.node_count(), graph.edge_count());
	let cable: CableType = sub.value_of("cable").unwrap().parse()?;
	let coords = points_of(sub);
	let ppos = ppos_of(sub);

	match name {
		"connect" => {
			let c = connect(&graph, cable, &params, &coords[0])?;
			if let Some(path) = sub.value_of("extended") {
				serde_json::to_writer(&std::fs::File::create(path)?, &c.extended)?;
				log::info!("extended graph written to {}", path);
			}
			emit(sub, &c.report)
		}
		"optimal_check" => {
			let router = Router::new(&graph, cable, &forbidden, &params)?;
			let report = router.optimal_check(&coords[0], &coords[1], &coords[2], &coords[3], None)?;
			emit(sub, &report)
		}
		_ => {
			let router = Router::new(&graph, cable, &forbidden, &params)?;
			let result = match name {
				"direct" => router.direct(&coords[0], &coords[1], None)?,
				"ppo" => router.ppo(&coords[0], &coords[1], &coords[2], None)?,
				"multi_ppo" => router.multi_ppo(&coords[0], &ppos, &coords[1], None)?,
				"forward_path" => router.forward_path(&coords[0], &ppos, &coords[1], None)?,
				other => {
					eprintln!("unknown subcommand {}", other);
					return Ok(());
				}
			};
			log::info!(
				"route found: {} points, {:.3} units, {} nodes explored over {} leg(s)",
				result.points.len(), result.total_distance, result.nodes_explored, result.legs.len()
			);
			emit(sub, &result)
		}
	}
}

/// Coordinate positionals, folded into points
fn points_of(sub: &ArgMatches<'_>) -> Vec<Point> {
	let floats: Vec<f64> = sub
		.values_of("coords")
		.map(|vs| vs.map(|v| v.parse().unwrap()).collect())
		.unwrap_or_default();
	floats.chunks(3).map(|c| Point::new(c[0], c[1], c[2])).collect()
}

/// Repeated `--ppo X Y Z` occurrences, in order
fn ppos_of(sub: &ArgMatches<'_>) -> Vec<Point> {
	let floats: Vec<f64> = sub
		.values_of("ppo")
		.map(|vs| vs.map(|v| v.parse().unwrap()).collect())
		.unwrap_or_default();
	floats.chunks(3).map(|c| Point::new(c[0], c[1], c[2])).collect()
}

fn load_params(path: Option<&str>) -> Result<Parameters, RouteError> {
	match path {
		Some(path) => Ok(serde_yaml::from_reader(&std::fs::File::open(path)?)?),
		None => Ok(Parameters::default()),
	}
}

/// Load a tagged graph, lifting legacy adjacency files into the tagged
/// model. Structural problems (missing tags included) surface as
/// `MalformedGraph`.
fn load_graph(path: &str, legacy: bool) -> Result<TaggedGraphFile, RouteError> {
	let file = std::fs::File::open(path)?;
	if legacy {
		let adjacency: LegacyAdjacencyFile = serde_json::from_reader(&file)
			.map_err(|e| RouteError::MalformedGraph(format!("{}: {}", path, e)))?;
		legacy_to_tagged(adjacency)
	} else {
		serde_json::from_reader(&file).map_err(|e| RouteError::MalformedGraph(format!("{}: {}", path, e)))
	}
}

fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, RouteError> {
	Ok(serde_json::from_reader(&std::fs::File::open(path)?)?)
}

/// Emit a result as JSON at full float precision
fn emit<T: serde::Serialize>(sub: &ArgMatches<'_>, value: &T) -> Result<(), RouteError> {
	match sub.value_of("output") {
		Some(path) => serde_json::to_writer_pretty(&std::fs::File::create(path)?, value)?,
		None => {
			serde_json::to_writer_pretty(std::io::stdout().lock(), value)?;
			println!();
		}
	}
	Ok(())
}
