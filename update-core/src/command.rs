/// Remote commands delivered over the messaging channel.
///
/// Payloads look like `{"command": "update"}`. Only `update` touches the
/// update state machine; everything else is handed back to the caller.
use serde::Deserialize;

use crate::error::UpdateError;
use crate::scheduler::UpdateTrigger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Check for a new release now and install it if it differs.
    Update,
    /// Publish the device status.
    Status,
    Unknown(String),
}

#[derive(Deserialize)]
struct CommandEnvelope {
    command: String,
}

impl RemoteCommand {
    pub fn parse(payload: &[u8]) -> Result<Self, UpdateError> {
        let envelope: CommandEnvelope =
            serde_json::from_slice(payload).map_err(|e| UpdateError::Parse(e.to_string()))?;

        Ok(match envelope.command.trim() {
            "update" => RemoteCommand::Update,
            "status" => RemoteCommand::Status,
            other => RemoteCommand::Unknown(other.to_string()),
        })
    }
}

/// Decodes `payload` and fires `trigger` for update commands.
pub fn route(payload: &[u8], trigger: &UpdateTrigger) -> Result<RemoteCommand, UpdateError> {
    let command = RemoteCommand::parse(payload)?;
    log::info!("Command: {:?}", command);
    if command == RemoteCommand::Update {
        trigger.request();
    }
    Ok(command)
}
