#[macro_use]
extern crate slog;
extern crate mesh_node;

use clap::{App, Arg, ArgMatches};
use crossbeam_channel::{unbounded, Sender};
use mesh_node::logging;
use mesh_node::node::node_config::NodeConfig;
use mesh_node::{MeshNodeError, MeshNodeErrorKind};
use std::fs;
use std::io::{self, BufRead};
use std::env;
use std::thread::{self, JoinHandle};

const ARG_CONFIG: &str = "config";
const ARG_ADDRESS: &str = "address";
const ARG_WORK_DIR: &str = "work_dir";
const ARG_ACCEPT_COMMANDS: &str = "accept_commands";
const ARG_TERMINAL_LOG: &str = "term_log";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const CONFIG_FILE_NAME: &str = "node.toml";
const COMMAND_THREAD_NAME: &str = "CommandLoop";
const ERROR_EXECUTION_FAILURE: i32 = 1;
const ERROR_INITIALIZATION: i32 = 2;

fn run(config: NodeConfig) -> Result<(), MeshNodeError> {
    let log_file_name = format!(
        "{}{}{}{}{}.log",
        &config.work_dir,
        std::path::MAIN_SEPARATOR,
        logging::LOG_DIR_NAME,
        std::path::MAIN_SEPARATOR,
        &config.address
    );
    let logger = logging::create_logger(&log_file_name, config.term_log.unwrap_or(false))
        .unwrap_or_else(|e| {
            eprintln!("node_cli failed with the following error: {}", e);
            ::std::process::exit(ERROR_INITIALIZATION);
        });

    info!(logger, "Node Config: {:?}", &config);
    let ac = config.accept_commands.unwrap_or(true);
    let mut node = config.create_node(logger.clone())?;

    //A node whose radio can't start must not serve traffic
    if let Err(e) = node.begin() {
        eprintln!("node_cli failed to start the radio: {}", e);
        //Flush the log before leaving
        drop(node);
        drop(logger);
        ::std::process::exit(ERROR_INITIALIZATION);
    }

    let commands = if ac {
        let (tx, rx) = unbounded();
        let _handle = start_command_thread(tx).map_err(|e| {
            let err_msg = String::from("Failed to start command_loop_thread");
            MeshNodeError::with_cause(MeshNodeErrorKind::Command(err_msg), e)
        })?;
        Some(rx)
    } else {
        None
    };

    //Every packet reported by the node goes to the host in wire format
    node.run(commands, |pkt| println!("{}", pkt))
}

// The thread holds no logger, so the log is flushed as soon as the node returns.
fn start_command_thread(tx: Sender<String>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(String::from(COMMAND_THREAD_NAME))
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        eprintln!("Failed to read command: {}", &e);
                        break;
                    }
                }
            }
        })
}

fn get_cli_parameters<'a>() -> ArgMatches<'a> {
    App::new("Node_cli")
        .version(VERSION)
        .author("Marco Caballero <marco.caballero@cl.cam.ac.uk>")
        .about("CLI interface to a node of the AODV mesh")
        .arg(
            Arg::with_name(ARG_CONFIG)
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Configuration file for the node.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(ARG_ADDRESS)
                .short("n")
                .long("address")
                .value_name("ADDRESS")
                .help("Address of the node on the mesh. Overrides the configuration file.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(ARG_WORK_DIR)
                .short("d")
                .long("work_dir")
                .value_name("DIR")
                .help("Operating directory for the program, where logs will be placed.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(ARG_ACCEPT_COMMANDS)
                .short("accept")
                .long("accept_commands")
                .value_name("true/false")
                .help("Should this node read commands from its standard input")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(ARG_TERMINAL_LOG)
                .short("log_term")
                .long("log_to_terminal")
                .value_name("true/false")
                .help("Should this node log operations to the terminal as well")
                .takes_value(true),
        )
        .get_matches()
}

fn validate_config(config: &mut NodeConfig, matches: &ArgMatches) -> Result<(), MeshNodeError> {
    // Mandatory values were checked when loading the TOML file, just check the values are appropriate.
    // Address
    config.address = matches
        .value_of(ARG_ADDRESS)
        .unwrap_or_else(|| config.address.as_str())
        .to_string();
    config.validate()?;

    //work_dir
    config.work_dir = matches
        .value_of(ARG_WORK_DIR)
        .unwrap_or_else(|| config.work_dir.as_str())
        .to_string();
    let dir_info = fs::metadata(std::path::Path::new(config.work_dir.as_str())).map_err(|e| {
        let err_msg = String::from("work_dir is not a valid directory");
        MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
    })?;
    if !dir_info.is_dir() || dir_info.permissions().readonly() {
        let err_msg = String::from("work_dir is not a directory or it's not writable");
        return Err(MeshNodeErrorKind::Configuration(err_msg).into());
    }

    // Accept commands
    config.accept_commands = matches
        .value_of(ARG_ACCEPT_COMMANDS)
        .map(|v| v.parse::<bool>().unwrap_or(true))
        .or(config.accept_commands);

    // Log to terminal
    config.term_log = matches
        .value_of(ARG_TERMINAL_LOG)
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .or(config.term_log);

    Ok(())
}

/// The init process performs all initialization required for the node_cli.
/// It performs 2 main tasks: read the configuration file and process the command line parameters.
fn init(matches: &ArgMatches) -> Result<NodeConfig, MeshNodeError> {
    //Read the configuration file.
    let config_file_path = match matches.value_of(ARG_CONFIG) {
        Some(path) => std::path::PathBuf::from(path),
        None => {
            //No configuration file was passed. Look for default option: current_dir + default name.
            let current_dir = env::current_dir().map_err(|e| {
                let err_msg = String::from("Failed to read current directory");
                MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
            })?;
            current_dir.join(CONFIG_FILE_NAME)
        }
    };
    let mut configuration = NodeConfig::load(&config_file_path)?;
    //Validate the current configuration
    validate_config(&mut configuration, matches)?;

    Ok(configuration)
}

fn main() {
    //Enable the a more readable version of backtraces
    color_backtrace::install();

    //Get the CLI parameters
    let matches = get_cli_parameters();

    //Initialization
    let config = init(&matches).unwrap_or_else(|e| {
        eprintln!("node_cli failed with the following error: {}", e);
        std::process::exit(ERROR_INITIALIZATION);
    });

    //Main loop
    if let Err(ref e) = run(config) {
        eprintln!("node_cli failed with the following error: {}", e);
        std::process::exit(ERROR_EXECUTION_FAILURE);
    }
}
