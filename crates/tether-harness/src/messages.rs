//! Schema fixtures shared by the integration tests.
//!
//! A tiny job-dispatch vocabulary: a `Ping` heartbeat plus a request and
//! result pair. The ids are stable so peers built from the same fixtures
//! always agree on the wire.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_core::Socket;
use tether_proto::{CborPrototype, Prototype, Result, SchemaType, TypeSource};

/// Heartbeat message carrying a sequence number.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Monotonic sequence number, echoed back by the peer
    pub seq: u64,
}

impl SchemaType for Ping {
    const TYPE_ID: u32 = 1;
    const TYPE_NAME: &'static str = "ping";
}

/// A unit of work submitted to the peer.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Caller-assigned id, echoed in the matching [`JobResult`]
    pub job_id: u64,
    /// Opaque work description
    pub payload: String,
}

impl SchemaType for JobRequest {
    const TYPE_ID: u32 = 2;
    const TYPE_NAME: &'static str = "job_request";
}

/// The outcome of a [`JobRequest`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Id of the request this answers
    pub job_id: u64,
    /// Whether the job ran to completion
    pub ok: bool,
    /// Result data or failure detail
    pub output: String,
}

impl SchemaType for JobResult {
    const TYPE_ID: u32 = 3;
    const TYPE_NAME: &'static str = "job_result";
}

/// Schema source declaring all three fixture types.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSchema;

impl TypeSource for FixtureSchema {
    fn load_types(&self) -> Result<Vec<Arc<dyn Prototype>>> {
        Ok(vec![
            Arc::new(CborPrototype::<Ping>::new()),
            Arc::new(CborPrototype::<JobRequest>::new()),
            Arc::new(CborPrototype::<JobResult>::new()),
        ])
    }
}

/// Register the fixture vocabulary on a fresh socket.
///
/// Panics if registration is refused; fixtures are only ever applied to
/// sockets in their initial state.
pub fn register_fixture_types(socket: &mut Socket) {
    assert!(
        socket.register_all_message_types(&FixtureSchema),
        "fixture registration refused; socket already left its initial state"
    );
}
