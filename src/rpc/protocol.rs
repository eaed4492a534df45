use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{timeline::category::Rule, utils::time::MINUTES_PER_DAY};

/// Version reported by the server and expected by the client.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PORT: u16 = 3456;

/// `error_type` of replies to requests the server couldn't understand.
pub const REQUEST_MALFORMED: &str = "request_malformed";

/// Longest request line the server accepts.
pub const MAX_REQUEST_LINE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Malformed request: {0}")]
    RequestMalformed(String),

    #[error("Not connected to a server")]
    NotConnected,

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Connection closed by the server")]
    Disconnected,

    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Request as it travels over the wire. Both fields are optional so that a missing `cmd` can be
/// answered with a proper error instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Ok {
        data: Value,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        what: String,
    },
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Reply::Ok { data }
    }

    /// Acknowledgement of commands that don't return anything.
    pub fn done() -> Self {
        Reply::Ok { data: json!({}) }
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        Reply::Error {
            error_type: Some(REQUEST_MALFORMED.into()),
            what: what.into(),
        }
    }

    pub fn error(what: impl Into<String>) -> Self {
        Reply::Error {
            error_type: None,
            what: what.into(),
        }
    }

    pub fn into_data(self) -> Result<Value, RpcError> {
        match self {
            Reply::Ok { data } => Ok(data),
            Reply::Error {
                error_type: Some(error_type),
                what,
            } if error_type == REQUEST_MALFORMED => Err(RpcError::RequestMalformed(what)),
            Reply::Error { what, .. } => Err(RpcError::Server(what)),
        }
    }
}

impl From<RpcError> for Reply {
    fn from(value: RpcError) -> Self {
        match value {
            RpcError::RequestMalformed(what) => Reply::malformed(what),
            other => Reply::error(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Version,
    Apps,
    Current,
    Rules,
    SetRules(Vec<Rule>),
    Note,
    SetNote(String),
    ClipFrom(u32),
    ClipTo(u32),
    Save,
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Apps => "apps",
            Command::Current => "current",
            Command::Rules => "rules",
            Command::SetRules(_) => "set_rules",
            Command::Note => "note",
            Command::SetNote(_) => "set_note",
            Command::ClipFrom(_) => "clip_from",
            Command::ClipTo(_) => "clip_to",
            Command::Save => "save",
            Command::Quit => "quit",
        }
    }

    /// Commands that take no data, by name.
    pub fn simple(name: &str) -> Option<Self> {
        let command = match name {
            "version" => Command::Version,
            "apps" => Command::Apps,
            "current" => Command::Current,
            "rules" => Command::Rules,
            "note" => Command::Note,
            "save" => Command::Save,
            "quit" => Command::Quit,
            _ => return None,
        };
        Some(command)
    }

    pub fn to_request(&self) -> Request {
        let data = match self {
            Command::SetRules(rules) => Some(json!({ "rules": rules })),
            Command::SetNote(note) => Some(json!({ "note": note })),
            Command::ClipFrom(index) | Command::ClipTo(index) => Some(json!({ "index": index })),
            _ => None,
        };
        Request {
            cmd: Some(self.name().into()),
            data,
        }
    }
}

fn field<T: DeserializeOwned>(data: Option<&Value>, key: &str) -> Result<T, RpcError> {
    let value = data
        .and_then(|data| data.get(key))
        .ok_or_else(|| RpcError::RequestMalformed(format!("No \"{key}\" provided")))?;
    T::deserialize(value)
        .map_err(|e| RpcError::RequestMalformed(format!("Invalid \"{key}\": {e}")))
}

fn minute_field(data: Option<&Value>) -> Result<u32, RpcError> {
    let index: u32 = field(data, "index")?;
    if index >= MINUTES_PER_DAY {
        return Err(RpcError::RequestMalformed(format!(
            "Invalid \"index\": {index} is not a minute of the day"
        )));
    }
    Ok(index)
}

impl TryFrom<Request> for Command {
    type Error = RpcError;

    fn try_from(request: Request) -> Result<Self, Self::Error> {
        let cmd = request
            .cmd
            .ok_or_else(|| RpcError::RequestMalformed("no \"cmd\" given".into()))?;
        let data = request.data.as_ref();
        let command = match cmd.as_str() {
            "set_rules" => Command::SetRules(field(data, "rules")?),
            "set_note" => Command::SetNote(field(data, "note")?),
            "clip_from" => Command::ClipFrom(minute_field(data)?),
            "clip_to" => Command::ClipTo(minute_field(data)?),
            other => Command::simple(other)
                .ok_or_else(|| RpcError::RequestMalformed(format!("Command '{other}' not known")))?,
        };
        Ok(command)
    }
}

/// Parses one request line into a command.
pub fn parse_request(line: &str) -> Result<Command, RpcError> {
    let request: Request = serde_json::from_str(line)
        .map_err(|e| RpcError::RequestMalformed(format!("Invalid JSON: {e}")))?;
    Command::try_from(request)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;

    use super::{parse_request, Command, Reply, RpcError};
    use crate::timeline::category::{Category, Rule};

    fn malformed(line: &str) -> String {
        match parse_request(line) {
            Err(RpcError::RequestMalformed(what)) => what,
            other => panic!("expected a malformed request, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_commands() -> Result<()> {
        assert_eq!(parse_request(r#"{"cmd":"version"}"#)?, Command::Version);
        assert_eq!(
            parse_request(r#"{"cmd":"quit","data":null}"#)?,
            Command::Quit
        );
        Ok(())
    }

    #[test]
    fn test_commands_with_data() -> Result<()> {
        assert_eq!(
            parse_request(r#"{"cmd":"clip_from","data":{"index":600}}"#)?,
            Command::ClipFrom(600)
        );
        assert_eq!(
            parse_request(r#"{"cmd":"set_rules","data":{"rules":[["^vim",2]]}}"#)?,
            Command::SetRules(vec![Rule::new("^vim", Category::Work)?])
        );
        Ok(())
    }

    #[test]
    fn test_malformed_requests() {
        assert_eq!(malformed(r#"{"cmd":"bogus"}"#), "Command 'bogus' not known");
        assert_eq!(malformed(r#"{"data":{}}"#), "no \"cmd\" given");
        assert_eq!(malformed(r#"{"cmd":"set_note"}"#), "No \"note\" provided");
        assert_eq!(
            malformed(r#"{"cmd":"set_rules","data":{}}"#),
            "No \"rules\" provided"
        );
        assert!(malformed(r#"{"cmd":"clip_to","data":{"index":-1}}"#).starts_with("Invalid"));
        assert_eq!(
            malformed(r#"{"cmd":"clip_from","data":{"index":1440}}"#),
            "Invalid \"index\": 1440 is not a minute of the day"
        );
        assert_eq!(
            parse_request(r#"{"cmd":"clip_to","data":{"index":1439}}"#).ok(),
            Some(Command::ClipTo(1439))
        );
        assert!(malformed(r#"{"cmd":"set_rules","data":{"rules":[["(",2]]}}"#)
            .starts_with("Invalid \"rules\""));
        assert!(malformed("not json").starts_with("Invalid JSON"));
    }

    #[test]
    fn test_requests_parse_back() -> Result<()> {
        let commands = [
            Command::SetNote("lunch".into()),
            Command::ClipTo(5),
            Command::SetRules(vec![Rule::new("mail", Category::Private)?]),
            Command::Current,
        ];
        for command in commands {
            let line = serde_json::to_string(&command.to_request())?;
            assert_eq!(parse_request(&line)?, command);
        }
        Ok(())
    }

    #[test]
    fn test_reply_wire_format() -> Result<()> {
        assert_eq!(
            serde_json::to_value(Reply::done())?,
            json!({"type": "ok", "data": {}})
        );
        assert_eq!(
            serde_json::to_value(Reply::malformed("x"))?,
            json!({"type": "error", "error_type": "request_malformed", "what": "x"})
        );
        assert_eq!(
            serde_json::to_value(Reply::error("disk full"))?,
            json!({"type": "error", "what": "disk full"})
        );
        assert!(matches!(
            Reply::malformed("x").into_data(),
            Err(RpcError::RequestMalformed(_))
        ));
        assert!(matches!(
            Reply::error("x").into_data(),
            Err(RpcError::Server(_))
        ));
        Ok(())
    }
}
