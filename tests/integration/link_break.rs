extern crate mesh_node;

use mesh_node::node::packet::PacketKind;
use mesh_node::node::LineOutcome;
use mesh_node::tests::common::*;

#[test]
fn link_break_invalidates_routes_and_triggers_rediscovery() {
    let data = setup("link_break", false);
    let mut mesh = TestMesh::line(&["01", "03", "05"], &data.logger);

    mesh.node_mut("01").handle_line("SEND 05 first");
    mesh.pump();
    assert!(mesh.node("01").routes().lookup("05").is_some());

    //03 goes out of range
    assert_eq!(mesh.node_mut("01").link_break("03"), 1);
    assert!(mesh.node("01").routes().lookup("05").is_none());
    //Invalid entries are kept until they expire
    let stale = mesh.node("01").routes().get("05").expect("Entry should remain");
    assert!(!stale.valid);

    //Breaking the same link again changes nothing
    assert_eq!(mesh.node_mut("01").link_break("03"), 0);

    //The next send floods a new request
    assert_eq!(
        mesh.node_mut("01").handle_line("SEND 05 second"),
        LineOutcome::Accepted
    );
    assert_eq!(mesh.node("01").state().broadcast_id(), 2);
    let reports = mesh.pump();

    let delivered: Vec<String> = reports
        .iter()
        .filter(|(addr, p)| addr == "05" && p.kind() == PacketKind::Data)
        .map(|(_, p)| p.message.clone())
        .collect();
    assert_eq!(delivered, vec![String::from("second")]);
    assert!(mesh.node("01").routes().lookup("05").is_some());

    drop(mesh);
    teardown(data);
}

#[test]
fn link_break_through_host_line() {
    let data = setup("link_break_line", false);
    let mut mesh = TestMesh::line(&["01", "03"], &data.logger);

    mesh.node_mut("01").handle_line("SEND 03 hi");
    mesh.pump();
    assert!(mesh.node("01").routes().lookup("03").is_some());

    assert_eq!(mesh.node_mut("01").handle_line("BREAK 03"), LineOutcome::Accepted);
    assert!(mesh.node("01").routes().lookup("03").is_none());

    drop(mesh);
    teardown(data);
}
