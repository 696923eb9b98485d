extern crate mesh_node;

use mesh_node::node::broadcasts::BroadcastTracker;

#[test]
fn each_flood_is_processed_once() {
    let mut tracker = BroadcastTracker::default();

    assert!(tracker.should_process("01", 1));
    assert!(!tracker.should_process("01", 1));
    assert!(tracker.should_process("01", 2));
    //Stale ids from the same origin are duplicates as well
    assert!(!tracker.should_process("01", 1));
    assert!(tracker.should_process("03", 1));
    assert_eq!(tracker.last_seen("01"), Some(2));
    assert_eq!(tracker.len(), 2);
}

#[test]
fn tracker_stays_within_capacity() {
    let mut tracker = BroadcastTracker::new(4);
    for i in 0..10 {
        let origin = format!("{:02}", i);
        assert!(tracker.should_process(&origin, 1));
    }

    assert_eq!(tracker.len(), 4);
    assert_eq!(tracker.last_seen("09"), Some(1));
    assert_eq!(tracker.last_seen("00"), None);
}
