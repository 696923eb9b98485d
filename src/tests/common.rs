use crate::logging;
use crate::node::aodv::Aodv;
use crate::node::node_config::AodvParams;
use crate::node::packet::Packet;
use crate::node::radio::SimulatedMedium;
use crate::node::Node;
use chrono::prelude::*;

use slog::Logger;
use std::env;
use std::fs;
use std::path::Path;

const MAX_PUMP_ROUNDS: usize = 1000;

/***********************************************/
/***************  Test Data Types  *************/
/***********************************************/
pub struct TestSetup {
    pub test_name: String,
    pub work_dir: String,
    pub log_file: String,
    pub node_cli: String,
    pub logger: Logger,
}

/// Several nodes sharing one simulated medium.
pub struct TestMesh {
    pub medium: SimulatedMedium,
    pub nodes: Vec<Node>,
}

impl TestMesh {
    /// Creates and starts one node per address. No links are set up.
    pub fn new(addresses: &[&str], logger: &Logger) -> TestMesh {
        let medium = SimulatedMedium::new();
        let nodes = addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                let radio = medium.create_radio(addr).expect("Could not create radio");
                let node_logger = logger.new(o!("node" => addr.to_string()));
                let aodv = Aodv::new(
                    &quiet_params(),
                    Node::rng_from_seed(i as u32 + 1),
                    node_logger.clone(),
                );
                let mut node =
                    Node::new(addr.to_string(), Box::new(radio), aodv, 1000, node_logger);
                node.begin().expect("Could not start node");
                node
            })
            .collect();

        TestMesh { medium, nodes }
    }

    /// Creates the nodes and links each one to the next, forming a line.
    pub fn line(addresses: &[&str], logger: &Logger) -> TestMesh {
        let mesh = TestMesh::new(addresses, logger);
        for pair in addresses.windows(2) {
            mesh.medium
                .connect(pair[0], pair[1])
                .expect("Could not link nodes");
        }
        mesh
    }

    pub fn node(&self, address: &str) -> &Node {
        self.nodes
            .iter()
            .find(|n| n.get_address() == address)
            .expect("No such node in the mesh")
    }

    pub fn node_mut(&mut self, address: &str) -> &mut Node {
        self.nodes
            .iter_mut()
            .find(|n| n.get_address() == address)
            .expect("No such node in the mesh")
    }

    /// Lets every node handle its pending frames until the medium is quiet.
    /// Returns the packets each node reported, tagged with its address.
    pub fn pump(&mut self) -> Vec<(String, Packet)> {
        let mut reports = Vec::new();
        for _round in 0..MAX_PUMP_ROUNDS {
            let mut active = false;
            for node in self.nodes.iter_mut() {
                while node.rx_pending() {
                    active = true;
                    if let Some(pkt) = node.on_packet_received() {
                        reports.push((node.get_address().to_string(), pkt));
                    }
                }
            }
            if !active {
                return reports;
            }
        }
        panic!("The mesh did not settle after {} rounds", MAX_PUMP_ROUNDS);
    }
}

/*******************************************
*********** Utility functions *************
********************************************/
/// Routing parameters without rebroadcast jitter, to keep tests fast.
pub fn quiet_params() -> AodvParams {
    AodvParams {
        jitter_min: Some(0),
        jitter_max: Some(0),
        ..Default::default()
    }
}

pub fn get_tests_root() -> String {
    env::var("MESH_NODE_TEST_DIR")
        .unwrap_or_else(|_| env::temp_dir().to_string_lossy().into_owned())
}

pub fn create_test_dir(test_name: &str) -> String {
    let test_dir = Path::new(&get_tests_root()).join(test_name);
    if !test_dir.exists() {
        fs::create_dir_all(&test_dir).unwrap_or_else(|_| {
            panic!(
                "Unable to create test results directory {}",
                test_dir.display()
            )
        });
    }

    format!("{}", test_dir.display())
}

pub fn get_node_cli_path() -> String {
    let file_pb = env::current_dir()
        .expect("Couldn't get current dir")
        .join("target")
        .join("debug")
        .join("node_cli");
    format!("{}", file_pb.display())
}

pub fn setup(base_name: &str, log_to_term: bool) -> TestSetup {
    let dir_name = format!("{}_{}", base_name.to_lowercase(), Utc::now().timestamp_nanos());
    let work_dir = create_test_dir(&dir_name);
    let log_file = format!(
        "{}{}{}{}{}.log",
        work_dir,
        std::path::MAIN_SEPARATOR,
        logging::LOG_DIR_NAME,
        std::path::MAIN_SEPARATOR,
        base_name
    );
    let logger =
        logging::create_logger(&log_file, log_to_term).expect("Failed to create logger");

    TestSetup {
        test_name: base_name.into(),
        work_dir,
        log_file,
        node_cli: get_node_cli_path(),
        logger,
    }
}

pub fn teardown(data: TestSetup) {
    //Flush the pending log records before removing the files
    drop(data.logger);

    //Remove the leftover logs and files in the work directory
    fs::remove_dir_all(&data.work_dir).expect("Failed to remove results directory");
}
