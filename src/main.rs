use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use routefs::client::Client;
use routefs::config::Config;
use routefs::coordinator::Coordinator;
use routefs::logging::{self, *};
use routefs::node::StorageNode;
use routefs::serve;
use routefs::utils::shutdown_signal;
use routefs::validation::Validator;

mod shell;

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &clap::ArgMatches) -> Result<Config, Box<dyn Error>> {
	let path = matches.get_one::<String>("config").map(PathBuf::from);
	let mut config = Config::load(path.as_deref())?;
	if let Some(level) = matches.get_one::<String>("log-level") {
		config.log_level = level.clone();
	}
	Ok(config)
}

fn apply_server_flags(config: &mut Config, matches: &clap::ArgMatches) {
	if let Some(listen) = matches.get_one::<String>("listen") {
		config.coordinator.listen = listen.clone();
	}
	if let Some(root) = matches.get_one::<String>("root") {
		config.coordinator.root = PathBuf::from(root);
	}
}

async fn run_coordinator(config: Config) -> Result<(), Box<dyn Error>> {
	let coordinator = Coordinator::new(&config);
	coordinator.prepare().await?;
	let listener = serve::bind(&config.coordinator.listen).await?;
	serve::serve(listener, Arc::new(coordinator), shutdown_signal()).await?;
	Ok(())
}

async fn run_node(config: Config, id: &str) -> Result<(), Box<dyn Error>> {
	let node_config = config.node(id).ok_or_else(|| format!("No storage node {} in configuration", id))?;
	let node = StorageNode::new(node_config, &config);
	node.prepare().await?;
	let listener = serve::bind(&node_config.address).await?;
	serve::serve(listener, Arc::new(node), shutdown_signal()).await?;
	Ok(())
}

async fn run_client(config: Config, commands: Vec<String>, out_dir: &Path) -> Result<(), Box<dyn Error>> {
	let mut client = Client::connect(&config).await?;
	if commands.is_empty() {
		shell::run_shell(&mut client, out_dir).await?;
		return Ok(());
	}
	let line = commands.join(" ");
	let message = shell::run_command(&mut client, &line, out_dir).await?;
	println!("{}", message);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let listen_arg = || Arg::new("listen").short('l').long("listen").value_name("ADDR").help("Listen address");
	let root_arg = || Arg::new("root").short('r').long("root").value_name("DIR").help("Managed root directory");

	let matches = Command::new("RouteFS")
		.version("0.1.0")
		.author("Szilard Hajba <szilard@symbion.hu>")
		.about("Extension-routed distributed file store")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Configuration file (TOML, or JSON5 for .json/.json5)"),
		)
		.arg(
			Arg::new("log-level")
				.long("log-level")
				.value_name("LEVEL")
				.global(true)
				.help("Log level when RUST_LOG is not set"),
		)
		.subcommand(
			Command::new("coordinator")
				.about("Run the coordinator")
				.arg(listen_arg())
				.arg(root_arg()),
		)
		.subcommand(
			Command::new("node")
				.about("Run a storage node")
				.arg(Arg::new("id").required(true).help("Node identifier from the configuration, e.g. S2"))
				.arg(listen_arg())
				.arg(root_arg()),
		)
		.subcommand(
			Command::new("client")
				.about("Connect to the coordinator; without a command, start an interactive shell")
				.arg(
					Arg::new("coordinator")
						.long("coordinator")
						.value_name("ADDR")
						.help("Coordinator address"),
				)
				.arg(
					Arg::new("out")
						.short('o')
						.long("out")
						.value_name("DIR")
						.help("Where downloads and archives are saved (default: current directory)"),
				)
				.arg(Arg::new("command").action(ArgAction::Append).num_args(1..).trailing_var_arg(true)),
		)
		.subcommand(Command::new("config").about("Print the effective configuration as JSON"))
		.get_matches();

	let mut config = load_config(&matches)?;

	if let Some(sub_matches) = matches.subcommand_matches("coordinator") {
		apply_server_flags(&mut config, sub_matches);
		config.validate()?;
		logging::init_tracing(&config.log_level, config.log_file.as_deref())?;
		run_coordinator(config).await?;
	} else if let Some(sub_matches) = matches.subcommand_matches("node") {
		let id = sub_matches.get_one::<String>("id").ok_or("node: identifier required")?.clone();
		{
			let node = config.node_mut(&id).ok_or_else(|| format!("No storage node {} in configuration", id))?;
			if let Some(listen) = sub_matches.get_one::<String>("listen") {
				node.address = listen.clone();
			}
			if let Some(root) = sub_matches.get_one::<String>("root") {
				node.root = PathBuf::from(root);
			}
		}
		config.validate()?;
		logging::init_tracing(&config.log_level, config.log_file.as_deref())?;
		run_node(config, &id).await?;
	} else if let Some(sub_matches) = matches.subcommand_matches("client") {
		if let Some(address) = sub_matches.get_one::<String>("coordinator") {
			config.coordinator.listen = address.clone();
		}
		config.validate()?;
		logging::init_tracing(&config.log_level, None)?;
		let out_dir = sub_matches.get_one::<String>("out").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
		let commands: Vec<String> =
			sub_matches.get_many::<String>("command").map(|v| v.cloned().collect()).unwrap_or_default();
		debug!("Client commands: {:?}", commands);
		run_client(config, commands, &out_dir).await?;
	} else if matches.subcommand_matches("config").is_some() {
		println!("{}", serde_json::to_string_pretty(&config)?);
	}

	Ok(())
}

// vim: ts=4
