//! Request validation and response envelopes for front ends of the cache.
//!
//! Message bodies are JSON objects `{"ts": <int>, "msg": <string>}`.
//! Responses are `{"status": "ok"}`, `{"status": "ok", "result": [...]}` or
//! `{"status": "nok", "message": "..."}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Ingestor, Message, MessageCache, NewMessage};

/// Listing size used when a request does not name one.
pub const DEFAULT_LIST_COUNT: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{0}")]
    Malformed(String),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Invalid count: {0}. Count has to be positive integer")]
    InvalidCount(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub msg: String,
}

/// Parses and validates a message body. `ts` must be positive and `msg`
/// non-empty.
pub fn parse_message(body: &str) -> Result<NewMessage, RequestError> {
    let wire: WireMessage =
        serde_json::from_str(body).map_err(|err| RequestError::Malformed(err.to_string()))?;
    if wire.ts <= 0 || wire.msg.is_empty() {
        return Err(RequestError::InvalidBody(body.to_string()));
    }
    Ok(NewMessage::new(wire.ts, wire.msg))
}

/// Parses the `count` parameter of a listing request.
pub fn parse_count(raw: Option<&str>) -> Result<usize, RequestError> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(DEFAULT_LIST_COUNT),
    };
    match raw.parse::<i64>() {
        Ok(count) if count > 0 => {
            usize::try_from(count).map_err(|_| RequestError::InvalidCount(raw.to_string()))
        }
        _ => Err(RequestError::InvalidCount(raw.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Nok,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            result: None,
            message: None,
        }
    }

    pub fn list(messages: Vec<Message>) -> Self {
        Self {
            status: Status::Ok,
            result: Some(messages),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Nok,
            result: None,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn to_json(&self) -> String {
        // Only strings and integers inside; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"nok"}"#.to_string())
    }
}

impl From<RequestError> for Response {
    fn from(err: RequestError) -> Self {
        Response::error(err.to_string())
    }
}

/// Validates `body` and queues it.
pub fn submit(ingestor: &Ingestor, body: &str) -> Response {
    let message = match parse_message(body) {
        Ok(message) => message,
        Err(err) => return err.into(),
    };
    match ingestor.enqueue(message) {
        Ok(()) => Response::ok(),
        Err(err) => Response::error(err.to_string()),
    }
}

/// Newest-first listing; `count` defaults to [`DEFAULT_LIST_COUNT`].
pub fn list(cache: &MessageCache, count: Option<&str>) -> Response {
    match parse_count(count) {
        Ok(count) => Response::list(cache.get_last(count)),
        Err(err) => err.into(),
    }
}

pub fn by_timestamp(cache: &MessageCache, timestamp: i64) -> Response {
    Response::list(cache.get_by_timestamp(timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_message() {
        let message = parse_message(r#"{"msg": "foobarbaz", "ts": 1566461840}"#).unwrap();
        assert_eq!(message, NewMessage::new(1566461840, "foobarbaz"));
    }

    #[test]
    fn rejects_message_with_unknown_fields_only() {
        let body = r#"{"msg123": "foobarbaz", "boo": 1566466640}"#;
        let err = parse_message(body).unwrap_err();
        assert_eq!(err, RequestError::InvalidBody(body.to_string()));
        assert_eq!(
            Response::from(err).to_json(),
            r#"{"status":"nok","message":"Invalid request body: {\"msg123\": \"foobarbaz\", \"boo\": 1566466640}"}"#
        );
    }

    #[test]
    fn rejects_empty_content_and_non_positive_ts() {
        assert!(matches!(
            parse_message(r#"{"msg": "", "ts": 5}"#),
            Err(RequestError::InvalidBody(_))
        ));
        assert!(matches!(
            parse_message(r#"{"msg": "x", "ts": 0}"#),
            Err(RequestError::InvalidBody(_))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_message("{not json"),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            parse_message(r#"{"msg": "x", "ts": "soon"}"#),
            Err(RequestError::Malformed(_))
        ));
    }

    #[test]
    fn count_defaults_and_validation() {
        assert_eq!(parse_count(None), Ok(DEFAULT_LIST_COUNT));
        assert_eq!(parse_count(Some("")), Ok(DEFAULT_LIST_COUNT));
        assert_eq!(parse_count(Some("15")), Ok(15));
        for bad in ["0", "-3", "ten", "1.5"] {
            assert_eq!(
                parse_count(Some(bad)),
                Err(RequestError::InvalidCount(bad.to_string()))
            );
        }
        assert_eq!(
            RequestError::InvalidCount("0".to_string()).to_string(),
            "Invalid count: 0. Count has to be positive integer"
        );
    }

    #[test]
    fn envelopes_serialize_like_the_wire_format() {
        assert_eq!(Response::ok().to_json(), r#"{"status":"ok"}"#);
        let listed = Response::list(vec![Message {
            pk: 0,
            timestamp: 3,
            content: "x".to_string(),
        }]);
        assert_eq!(
            listed.to_json(),
            r#"{"status":"ok","result":[{"pk":0,"ts":3,"msg":"x"}]}"#
        );
        assert_eq!(
            Response::error("queue full").to_json(),
            r#"{"status":"nok","message":"queue full"}"#
        );
    }

    #[test]
    fn response_parses_back() {
        let raw = r#"{"status": "ok", "result": [{"pk": 4, "ts": 9, "msg": "y"}]}"#;
        let response: Response = serde_json::from_str(raw).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.result.unwrap()[0].pk, 4);
    }
}
