//! Progress events streamed to the connected client
//!
//! Every event is serialized at exactly one place, [`ProgressEvent::to_message`],
//! so field names cannot drift between call sites.

use serde::Serialize;

/// Target id used on the wire for session-wide events
pub const SESSION_EVENT_ID: i64 = -1;

/// Sentinel speed value reported when no throughput is available
pub const SPEED_SENTINEL: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started,
    ServerRegistered {
        id: usize,
        uri: String,
        group: String,
        remarks: String,
        protocol: String,
        remap_id: Option<i64>,
    },
    PingStarted {
        id: usize,
    },
    PingResult {
        id: usize,
        latency: i64,
    },
    SpeedStarted {
        id: usize,
    },
    SpeedSample {
        id: usize,
        avg: i64,
        max: i64,
        instant: i64,
    },
    TargetFinished {
        id: usize,
    },
    AllFinished,
    ReportReady {
        data_uri: String,
    },
    Fatal {
        reason: String,
    },
}

/// Flat wire representation shared by all event kinds
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    id: i64,
    info: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    servername: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remap_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ping: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maxspeed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instant: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl<'a> WireMessage<'a> {
    fn new(id: i64, info: &'static str) -> Self {
        Self {
            id,
            info,
            servername: None,
            server: None,
            group: None,
            protocol: None,
            remap_id: None,
            ping: None,
            speed: None,
            maxspeed: None,
            instant: None,
            data: None,
            reason: None,
        }
    }
}

impl ProgressEvent {
    /// Sentinel sample emitted when a target has no usable throughput
    pub fn speed_unavailable(id: usize) -> Self {
        Self::SpeedSample {
            id,
            avg: SPEED_SENTINEL,
            max: SPEED_SENTINEL,
            instant: 0,
        }
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::ServerRegistered { .. } => "gotserver",
            Self::PingStarted { .. } => "startping",
            Self::PingResult { .. } => "gotping",
            Self::SpeedStarted { .. } => "startspeed",
            Self::SpeedSample { .. } => "gotspeed",
            Self::TargetFinished { .. } => "endone",
            Self::AllFinished => "eof",
            Self::ReportReady { .. } => "picdata",
            Self::Fatal { .. } => "error",
        }
    }

    /// Target position this event refers to, if any
    pub fn target_id(&self) -> Option<usize> {
        match self {
            Self::ServerRegistered { id, .. }
            | Self::PingStarted { id }
            | Self::PingResult { id, .. }
            | Self::SpeedStarted { id }
            | Self::SpeedSample { id, .. }
            | Self::TargetFinished { id } => Some(*id),
            Self::Started | Self::AllFinished | Self::ReportReady { .. } | Self::Fatal { .. } => None,
        }
    }

    /// Serialize into the JSON text frame sent to the client
    pub fn to_message(&self) -> String {
        let id = self
            .target_id()
            .map(|id| id as i64)
            .unwrap_or(SESSION_EVENT_ID);
        let mut wire = WireMessage::new(id, self.kind());

        match self {
            Self::ServerRegistered { uri, group, remarks, protocol, remap_id, .. } => {
                wire.servername = Some(remarks);
                wire.server = Some(uri);
                wire.group = Some(group);
                wire.protocol = Some(protocol);
                wire.remap_id = *remap_id;
            }
            Self::PingResult { latency, .. } => {
                wire.ping = Some(*latency);
            }
            Self::SpeedSample { avg, max, instant, .. } => {
                wire.speed = Some(*avg);
                wire.maxspeed = Some(*max);
                wire.instant = Some(*instant);
            }
            Self::ReportReady { data_uri } => {
                wire.data = Some(data_uri);
            }
            Self::Fatal { reason } => {
                wire.reason = Some(reason);
            }
            Self::Started
            | Self::PingStarted { .. }
            | Self::SpeedStarted { .. }
            | Self::TargetFinished { .. }
            | Self::AllFinished => {}
        }

        // A struct of strings and integers cannot fail to serialize
        serde_json::to_string(&wire).unwrap_or_else(|_| {
            format!("{{\"id\":{},\"info\":\"{}\"}}", id, self.kind())
        })
    }
}
