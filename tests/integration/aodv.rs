extern crate mesh_node;

use mesh_node::logging;
use mesh_node::node::aodv::{DataMessage, RouteRequestMessage};
use mesh_node::node::packet::{Packet, PacketKind};
use mesh_node::node::LineOutcome;
use mesh_node::tests::common::*;

fn reports_of<'a>(reports: &'a [(String, Packet)], address: &str) -> Vec<&'a Packet> {
    reports
        .iter()
        .filter(|(addr, _)| addr == address)
        .map(|(_, pkt)| pkt)
        .collect()
}

#[test]
fn aodv_route_discovery_and_delivery() {
    let data = setup("aodv_discovery", false);
    let mut mesh = TestMesh::line(&["01", "03", "05"], &data.logger);

    let outcome = mesh.node_mut("01").handle_line("SEND 05 hello mesh");
    assert_eq!(outcome, LineOutcome::Accepted);
    assert!(mesh.node("01").state().is_discovering("05"));
    assert_eq!(mesh.node("01").state().queued_count("05"), 1);

    let reports = mesh.pump();

    //05 heard the request relayed by 03
    let relayed = reports_of(&reports, "05")
        .into_iter()
        .find(|p| p.kind() == PacketKind::RouteRequest)
        .expect("05 never heard the route request");
    let rreq = RouteRequestMessage::from_packet(relayed).expect("Malformed route request");
    assert_eq!(relayed.sender, "03");
    assert_eq!(rreq.origin, "01");
    assert_eq!(rreq.destination, "05");
    assert_eq!(rreq.hop_count, 1);
    assert_eq!(rreq.ttl, 9);

    //01 now has a route to 05 through 03
    let route = mesh
        .node("01")
        .routes()
        .lookup("05")
        .expect("01 has no route to 05")
        .clone();
    assert_eq!(route.next_hop, "03");
    assert_eq!(route.hop_count, 1);
    assert!(!mesh.node("01").state().is_discovering("05"));
    assert_eq!(mesh.node("01").state().queued_count("05"), 0);

    //Reverse routes were installed along the way
    let back = mesh.node("05").routes().lookup("01").expect("05 has no route to 01");
    assert_eq!(back.next_hop, "03");
    assert_eq!(back.hop_count, 2);

    //05 reported the payload with its originator as sender
    let delivered: Vec<&Packet> = reports_of(&reports, "05")
        .into_iter()
        .filter(|p| p.kind() == PacketKind::Data)
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].sender, "01");
    assert_eq!(delivered[0].channel_id, "05");
    assert_eq!(delivered[0].message, "hello mesh");

    //Relays never report DATA
    assert!(reports_of(&reports, "03")
        .iter()
        .all(|p| p.kind() != PacketKind::Data));

    //Once the route is known, data goes out without a new discovery
    let outcome = mesh.node_mut("01").handle_line("SEND 05 second");
    assert_eq!(outcome, LineOutcome::Accepted);
    assert_eq!(mesh.node("01").state().broadcast_id(), 1);
    let reports = mesh.pump();
    let delivered: Vec<&Packet> = reports_of(&reports, "05")
        .into_iter()
        .filter(|p| p.kind() == PacketKind::Data)
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].message, "second");

    drop(mesh);
    teardown(data);
}

#[test]
fn aodv_destination_in_range_of_origin_delivers_once() {
    let data = setup("aodv_deliver_once", false);
    let mut mesh = TestMesh::line(&["01", "03", "05"], &data.logger);

    mesh.node_mut("01").handle_line("SEND 05 first");
    mesh.pump();
    assert_eq!(
        mesh.node("01").routes().lookup("05").map(|r| r.next_hop.clone()),
        Some(String::from("03"))
    );

    //05 now hears 01 directly as well as through 03
    mesh.medium.connect("01", "05").expect("Could not link nodes");
    assert_eq!(
        mesh.node_mut("01").handle_line("SEND 05 second"),
        LineOutcome::Accepted
    );
    let reports = mesh.pump();

    let delivered: Vec<&Packet> = reports_of(&reports, "05")
        .into_iter()
        .filter(|p| p.kind() == PacketKind::Data)
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].message, "second");
    assert_eq!(delivered[0].sender, "01");

    drop(mesh);
    teardown(data);
}

#[test]
fn aodv_payload_keeps_delimiters() {
    let data = setup("aodv_delimiters", false);
    let mut mesh = TestMesh::line(&["01", "03"], &data.logger);

    let line = "0||DATA||03||01||00||4||0||a||b";
    assert_eq!(mesh.node_mut("01").handle_line(line), LineOutcome::Accepted);
    let reports = mesh.pump();

    let delivered = reports_of(&reports, "03")
        .into_iter()
        .find(|p| p.kind() == PacketKind::Data)
        .expect("03 got no data");
    assert_eq!(delivered.message, "a||b");

    drop(mesh);
    teardown(data);
}

#[test]
fn aodv_unreachable_destination_keeps_discovering() {
    let data = setup("aodv_unreachable", false);
    let mut mesh = TestMesh::line(&["01", "03"], &data.logger);

    assert_eq!(
        mesh.node_mut("01").handle_line("SEND 09 nobody home"),
        LineOutcome::Accepted
    );
    assert_eq!(
        mesh.node_mut("01").handle_line("SEND 09 still nobody"),
        LineOutcome::Accepted
    );
    let reports = mesh.pump();

    //A single flood went out for both payloads
    let floods = reports_of(&reports, "03")
        .into_iter()
        .filter(|p| p.kind() == PacketKind::RouteRequest)
        .count();
    assert_eq!(floods, 1);
    assert_eq!(mesh.node("01").state().broadcast_id(), 1);
    assert_eq!(mesh.node("01").state().queued_count("09"), 2);
    assert!(mesh.node("01").routes().lookup("09").is_none());

    drop(mesh);
    teardown(data);
}

#[test]
fn aodv_log_records() {
    let data = setup("aodv_logs", false);
    let mut mesh = TestMesh::line(&["01", "03", "05"], &data.logger);

    mesh.node_mut("01").handle_line("SEND 05 logged");
    mesh.pump();

    //Flush the log before reading it back
    drop(mesh);
    let log_file = data.log_file.clone();
    let TestSetup {
        logger, work_dir, ..
    } = data;
    drop(logger);

    let records = logging::get_log_records_from_file(&log_file).expect("Could not read log");
    assert!(logging::find_record_by_msg("Send command received", &records).is_some());
    assert!(logging::find_record_by_msg("Route discovery started", &records).is_some());

    let received = logging::get_received_packet_records(&log_file).expect("Could not read log");
    let accepted_data = received
        .iter()
        .find(|r| r.channel_name == "DATA" && r.status == "ACCEPTED")
        .expect("No accepted DATA record");
    assert_eq!(accepted_data.channel_id, "05");
    assert_eq!(accepted_data.sender, "03");
    assert!(received
        .iter()
        .any(|r| r.channel_name == "RREQ" && r.status == "FORWARDING"));
    assert!(received
        .iter()
        .any(|r| r.channel_name == "RREQ" && r.reason == "DUPLICATE"));

    let sent = logging::get_sent_packet_records(&log_file).expect("Could not read log");
    assert!(sent.iter().any(|r| r.channel_name == "RREP"));

    std::fs::remove_dir_all(&work_dir).expect("Failed to remove results directory");
}

#[test]
fn aodv_data_message_layout() {
    let msg = DataMessage {
        origin: String::from("01"),
        next_hop: String::from("03"),
        hop_count: 0,
        payload: String::from("x||y"),
    };
    let pkt = msg.to_packet("05", "01");

    assert_eq!(pkt.channel_id, "05");
    assert_eq!(pkt.message, "01||03||0||x||y");
    assert_eq!(DataMessage::from_packet(&pkt).expect("Malformed record"), msg);
}
