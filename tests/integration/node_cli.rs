extern crate mesh_node;

use mesh_node::logging::{self, LOG_DIR_NAME};
use mesh_node::node::node_config::{NodeConfig, RadioMode};
use mesh_node::tests::common::*;

#[test]
fn node_cli_missing_config_file() {
    let data = setup("cli_missing_config", false);
    let config_file = format!("{}/does_not_exist.toml", &data.work_dir);

    assert_cli::Assert::command(&[&data.node_cli])
        .with_args(&["-c", &config_file])
        .fails_with(2)
        .stderr()
        .contains("Failed to open configuration file")
        .unwrap();

    teardown(data);
}

#[test]
fn node_cli_runs_until_finish() {
    let data = setup("cli_finish", false);
    let mut config = NodeConfig::new();
    config.address = String::from("0C");
    config.work_dir = data.work_dir.clone();
    config.radio.mode = RadioMode::Simulated;
    let config_file = format!("{}/node.toml", &data.work_dir);
    config
        .write_to_file(&config_file)
        .expect("Could not write configuration");

    assert_cli::Assert::command(&[&data.node_cli])
        .with_args(&["-c", &config_file])
        .stdin("[INFO] echoed line\nROUTES\nFINISH\n")
        .succeeds()
        .unwrap();

    let node_log = format!(
        "{}{}{}{}0C.log",
        &data.work_dir,
        std::path::MAIN_SEPARATOR,
        LOG_DIR_NAME,
        std::path::MAIN_SEPARATOR
    );
    let records = logging::get_log_records_from_file(&node_log).expect("Could not read node log");
    assert!(logging::find_record_by_msg("Node started", &records).is_some());
    assert!(logging::find_record_by_msg("Finish command received", &records).is_some());

    teardown(data);
}
