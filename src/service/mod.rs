//! NDJSON control-plane service for a world server.
//!
//! Translates newline-delimited JSON commands into calls on a [`WorldServer`]
//! and writes one response line per request. Callbacks registered through the
//! `recover` command report back as `variable_recovered` event lines written
//! before the response of the command that fired them. Commands are processed
//! sequentially.

pub mod transport;

use crate::PROTOCOL_VERSION;
use crate::runtime::WorldServer;
use crate::runtime::character::{CharacterHandle, CharacterId};
use crate::runtime::error::QuestError;
use crate::runtime::quest::{QuestCallback, Recovery};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// Service entry point: wraps a [`WorldServer`] and writes responses to a writer.
pub struct Service<W: Write> {
    server: WorldServer,
    writer: W,
    events: Rc<RefCell<Vec<Value>>>,
    handshake_completed: bool,
}

impl<W: Write> Service<W> {
    /// Create a new service around a world server.
    pub fn new(server: WorldServer, writer: W) -> Self {
        Self {
            server,
            writer,
            events: Rc::new(RefCell::new(Vec::new())),
            handshake_completed: false,
        }
    }

    /// The wrapped world server.
    pub fn server(&self) -> &WorldServer {
        &self.server
    }

    /// Consume requests from the reader until EOF.
    pub fn run<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            self.handle_line(&line?)?;
        }
        Ok(())
    }

    /// Process a single request line.
    pub fn handle_line(&mut self, line: &str) -> io::Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let response = match serde_json::from_str::<RequestEnvelope>(line) {
            Ok(request) => self.handle_request(request),
            Err(err) => {
                ResponseEnvelope::from_error(Value::Null, ServiceError::Parse(err.to_string()))
            }
        };

        let events: Vec<Value> = self.events.borrow_mut().drain(..).collect();
        for event in &events {
            self.write_line(event)?;
        }
        self.write_line(&response)
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()
    }

    fn handle_request(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        match self.dispatch(&request.command, &request.params) {
            Ok(value) => ResponseEnvelope::success(request.id, value),
            Err(err) => ResponseEnvelope::from_error(request.id, err),
        }
    }

    fn dispatch(&mut self, command: &str, params: &Value) -> Result<Value, ServiceError> {
        if command == "handshake" {
            return self.cmd_handshake(params);
        }
        self.ensure_handshake()?;

        match command {
            "spawn" => self.cmd_spawn(params),
            "read" => self.cmd_read(params),
            "write" => self.cmd_write(params),
            "recover" => self.cmd_recover(params),
            "recovered" => self.cmd_recovered(params),
            "remove" => self.cmd_remove(params),
            "return" => self.cmd_return(params),
            "disconnect" => self.cmd_disconnect(params),
            "stats" => self.cmd_stats(),
            other => Err(ServiceError::Unsupported(other.to_string())),
        }
    }

    fn cmd_handshake(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let client = str_param(params, "client")?;
        let requested = str_param(params, "protocol_version")?;

        if requested != PROTOCOL_VERSION {
            return Err(ServiceError::Protocol(format!(
                "unsupported protocol version: expected {}, got {}",
                PROTOCOL_VERSION, requested
            )));
        }

        self.handshake_completed = true;

        Ok(json!({
            "protocol_version": PROTOCOL_VERSION,
            "runtime": {
                "version": crate::VERSION,
                "client": client,
                "dedup_requests": self.server.config().dedup_requests,
            }
        }))
    }

    fn ensure_handshake(&self) -> Result<(), ServiceError> {
        if self.handshake_completed {
            Ok(())
        } else {
            Err(ServiceError::Protocol(
                "handshake required before issuing commands".into(),
            ))
        }
    }

    fn cmd_spawn(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let id = character_param(params)?;
        let name = params.get("name").and_then(Value::as_str).unwrap_or("");
        let handle = self.server.spawn_character(id, name)?;
        Ok(json!({ "character": id, "handle": handle }))
    }

    fn cmd_read(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let handle = self.resolve(params)?;
        let name = str_param(params, "name")?;
        Ok(json!({ "value": self.server.read(handle, name) }))
    }

    fn cmd_write(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let handle = self.resolve(params)?;
        let name = str_param(params, "name")?;
        let value = str_param(params, "value")?;
        let outcome = self.server.write(handle, name, value)?;
        Ok(json!({ "outcome": outcome }))
    }

    fn cmd_recover(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let handle = self.resolve(params)?;
        let name = str_param(params, "name")?;
        let tag = params.get("tag").cloned().unwrap_or(Value::Null);

        if let Some(value) = self.server.read(handle, name) {
            return Ok(json!({ "requested": false, "value": value }));
        }

        let events = self.events.clone();
        let callback = QuestCallback::new(move |scope, name, value| {
            events.borrow_mut().push(json!({
                "event": "variable_recovered",
                "character": scope.character().id(),
                "name": name,
                "value": value,
                "tag": tag,
            }));
        });

        self.server.recover_variable(handle, name, callback)?;
        Ok(json!({ "requested": true }))
    }

    fn cmd_recovered(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let id = character_param(params)?;
        let name = str_param(params, "name")?;
        let value = str_param(params, "value")?;

        let result = match self.server.variable_recovered(id, name, value) {
            Recovery::Delivered { callbacks } => json!({ "outcome": "delivered", "callbacks": callbacks }),
            Recovery::Stale => json!({ "outcome": "stale" }),
            Recovery::Unexpected => json!({ "outcome": "unexpected" }),
        };
        Ok(result)
    }

    fn cmd_remove(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let handle = self.resolve(params)?;
        self.server.remove_character(handle)?;
        Ok(json!({ "active": false }))
    }

    fn cmd_return(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let handle = self.resolve(params)?;
        self.server.return_character(handle)?;
        Ok(json!({ "active": true }))
    }

    fn cmd_disconnect(&mut self, params: &Value) -> Result<Value, ServiceError> {
        let handle = self.resolve(params)?;
        let character = self.server.disconnect_character(handle)?;
        Ok(json!({
            "character": character.id(),
            "cached_variables": character.quest_cache().len(),
        }))
    }

    fn cmd_stats(&mut self) -> Result<Value, ServiceError> {
        Ok(json!({
            "characters": self.server.world().len(),
            "pending": self.server.stats(),
        }))
    }

    fn resolve(&self, params: &Value) -> Result<CharacterHandle, ServiceError> {
        let id = character_param(params)?;
        self.server
            .handle_of(id)
            .ok_or(ServiceError::UnknownCharacter(id))
    }
}

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, ServiceError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::invalid_param(name))
}

fn character_param(params: &Value) -> Result<CharacterId, ServiceError> {
    params
        .get("character")
        .and_then(Value::as_u64)
        .and_then(|raw| u32::try_from(raw).ok())
        .map(CharacterId)
        .ok_or_else(|| ServiceError::invalid_param("character"))
}

#[derive(Debug)]
enum ServiceError {
    Parse(String),
    InvalidParams(String),
    Unsupported(String),
    Protocol(String),
    UnknownCharacter(CharacterId),
    Quest(QuestError),
}

impl ServiceError {
    fn invalid_param(name: &str) -> Self {
        ServiceError::InvalidParams(format!("missing or invalid parameter: {}", name))
    }
}

impl From<QuestError> for ServiceError {
    fn from(err: QuestError) -> Self {
        ServiceError::Quest(err)
    }
}

#[derive(Deserialize)]
struct RequestEnvelope {
    id: Value,
    command: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl ResponseEnvelope {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn from_error(id: Value, error: ServiceError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorEnvelope::from(error)),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(error: ServiceError) -> Self {
        let (code, message) = match error {
            ServiceError::Parse(message) => ("parse_error", message),
            ServiceError::InvalidParams(message) => ("invalid_params", message),
            ServiceError::Unsupported(command) => (
                "unsupported_command",
                format!("Command '{command}' is not supported"),
            ),
            ServiceError::Protocol(message) => ("protocol_error", message),
            ServiceError::UnknownCharacter(id) => {
                ("unknown_character", format!("Character id {id} is not in the world"))
            }
            ServiceError::Quest(err) => ("quest_error", err.to_string()),
        };

        ErrorEnvelope {
            code: code.into(),
            message,
        }
    }
}
