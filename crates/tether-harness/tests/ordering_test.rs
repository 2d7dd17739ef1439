//! Delivery-order guarantees over the in-memory transport.

use std::time::Duration;

use tether_harness::messages::{JobRequest, JobResult, Ping};
use tether_harness::{connected_pair, init_tracing, take_with_timeout, MemoryNetwork};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn one_hundred_messages_arrive_in_send_order() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut server, client) = connected_pair(&net, 1);

    for job_id in 0..100u64 {
        client.send_message(Box::new(JobRequest {
            job_id,
            payload: format!("job {job_id}"),
        }));
    }

    for expected in 0..100u64 {
        let message = take_with_timeout(&mut server, RECV_TIMEOUT)
            .unwrap_or_else(|| panic!("message {expected} should arrive"));
        let request = message.downcast::<JobRequest>().expect("a job request");
        assert_eq!(request.job_id, expected);
        assert_eq!(request.payload, format!("job {expected}"));
    }

    // Exactly one delivery per send: nothing extra is pending
    assert!(server.take_next_message().is_none());
}

#[test]
fn mixed_types_keep_a_single_fifo() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut server, client) = connected_pair(&net, 1);

    // Interleave three types; order is per-stream, not per-type
    client.send_message(Box::new(Ping { seq: 1 }));
    client.send_message(Box::new(JobRequest { job_id: 2, payload: "work".into() }));
    client.send_message(Box::new(JobResult { job_id: 2, ok: true, output: "done".into() }));
    client.send_message(Box::new(Ping { seq: 3 }));

    let first = take_with_timeout(&mut server, RECV_TIMEOUT).expect("first");
    assert_eq!(first.downcast::<Ping>().expect("ping").seq, 1);

    let second = take_with_timeout(&mut server, RECV_TIMEOUT).expect("second");
    assert_eq!(second.downcast::<JobRequest>().expect("request").job_id, 2);

    let third = take_with_timeout(&mut server, RECV_TIMEOUT).expect("third");
    assert!(third.downcast::<JobResult>().expect("result").ok);

    let fourth = take_with_timeout(&mut server, RECV_TIMEOUT).expect("fourth");
    assert_eq!(fourth.downcast::<Ping>().expect("ping").seq, 3);
}

#[test]
fn both_directions_carry_traffic_independently() {
    init_tracing();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connected_pair(&net, 1);

    client.send_message(Box::new(Ping { seq: 10 }));
    server.send_message(Box::new(Ping { seq: 20 }));

    let at_server = take_with_timeout(&mut server, RECV_TIMEOUT).expect("client's ping");
    assert_eq!(at_server.downcast::<Ping>().expect("ping").seq, 10);

    let at_client = take_with_timeout(&mut client, RECV_TIMEOUT).expect("server's ping");
    assert_eq!(at_client.downcast::<Ping>().expect("ping").seq, 20);
}
