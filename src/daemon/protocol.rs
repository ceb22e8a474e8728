//! Wire format of the control socket
//!
//! One JSON object per line in each direction.

use bbswitch_types::SleepEvent;
use serde::{Deserialize, Serialize};

/// A request sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Read the status line
    Read,
    /// Write raw command text (`ON`, `OFF`)
    Write { data: String },
    /// Deliver a sleep lifecycle notification
    Sleep { event: SleepEvent },
}

/// The daemon's answer to a [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    State { line: String },
    Written { len: usize },
    Ack,
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&Request::Write { data: "OFF".into() }).unwrap();
        assert_eq!(json, r#"{"op":"write","data":"OFF"}"#);

        let request: Request =
            serde_json::from_str(r#"{"op":"sleep","event":"post_hibernation"}"#).unwrap();
        assert_eq!(request, Request::Sleep { event: SleepEvent::PostHibernation });

        let request: Request = serde_json::from_str(r#"{"op":"read"}"#).unwrap();
        assert_eq!(request, Request::Read);
    }

    #[test]
    fn test_response_wire_format() {
        let response = Response::State {
            line: "0000:01:00.0 ON".into(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"state","line":"0000:01:00.0 ON"}"#);
        assert_eq!(serde_json::to_string(&Response::Ack).unwrap(), r#"{"status":"ack"}"#);
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"reboot"}"#).is_err());
    }
}
