//! JSON wire codec for protocol messages.
//!
//! The envelope is a flat JSON object: the payload fields at top level plus
//! an injected `action` string.
//!
//! ```json
//! { "action": "GRANT_OPERATION", "virtualNetworkFunctionRecord": { ... } }
//! ```
//!
//! Decoding probes the `action` field alone, selects the payload shape from
//! `(sender, action)` and then parses the bytes straight into that shape.
//! Combinations without a dedicated shape decode to [`Unrecognized`].

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::message::{Message, Payload, Shape, Unrecognized};
use super::{Action, SenderType};

// ============================================================================
// Constants
// ============================================================================

/// Envelope key carrying the action.
const ACTION_KEY: &str = "action";

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a message to its wire form.
///
/// The `action` field is always derived from the payload. Actions outside
/// the closed set are written as `NO_ACTION_SPECIFIED`.
///
/// # Errors
///
/// Returns [`Error::Json`] if the payload cannot be serialized.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let mut body = match message.payload() {
        Payload::OrInstantiate(body) => to_object(body)?,
        Payload::OrGrant(body) => to_object(body)?,
        Payload::OrError(body) => to_object(body)?,
        Payload::OrHeal(body) => to_object(body)?,
        Payload::OrScaling(body) => to_object(body)?,
        Payload::OrStartStop(body) => to_object(body)?,
        Payload::OrUpdate(body) => to_object(body)?,
        Payload::OrGeneric(body) => to_object(body)?,
        Payload::VnfmInstantiate(body) => to_object(body)?,
        Payload::VnfmGrant(body) => to_object(body)?,
        Payload::VnfmAllocateResources(body) => to_object(body)?,
        Payload::VnfmError(body) => to_object(body)?,
        Payload::VnfmHeal(body) => to_object(body)?,
        Payload::VnfmScaled(body) => to_object(body)?,
        Payload::VnfmScaling(body) => to_object(body)?,
        Payload::VnfmStartStop(body) => to_object(body)?,
        Payload::VnfmGeneric(body) => to_object(body)?,
        Payload::Unrecognized(body) => body.fields.clone(),
    };

    body.insert(
        ACTION_KEY.to_string(),
        Value::String(message.action().as_wire().to_string()),
    );

    Ok(serde_json::to_vec(&Value::Object(body))?)
}

fn to_object<T: serde::Serialize>(body: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(body)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::protocol(format!(
            "payload serialized to non-object JSON: {other}"
        ))),
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Reads only the `action` field, skipping everything else.
#[derive(Deserialize)]
struct ActionProbe<'a> {
    #[serde(borrow, default)]
    action: Option<Cow<'a, str>>,
}

/// Decodes a wire message sent by `sender`.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] if the bytes are not a JSON object,
/// if `action` is missing or not a string, or if the body does not match
/// the selected shape.
pub fn decode(bytes: &[u8], sender: SenderType) -> Result<Message> {
    let probe: ActionProbe<'_> = serde_json::from_slice(bytes)
        .map_err(|e| Error::malformed(format!("invalid envelope: {e}")))?;

    let action = probe
        .action
        .map(|raw| Action::from_wire(&raw))
        .ok_or_else(|| Error::malformed("missing action field"))?;

    let shape = Shape::select(sender, &action);

    let payload = match shape {
        Shape::OrInstantiate => Payload::OrInstantiate(parse(bytes, shape)?),
        Shape::OrGrant => Payload::OrGrant(parse(bytes, shape)?),
        Shape::OrError => Payload::OrError(parse(bytes, shape)?),
        Shape::OrHeal => Payload::OrHeal(parse(bytes, shape)?),
        Shape::OrUpdate => Payload::OrUpdate(parse(bytes, shape)?),
        Shape::OrScaling => {
            let mut body: super::OrScaling = parse(bytes, shape)?;
            body.action = action;
            Payload::OrScaling(body)
        }
        Shape::OrStartStop => {
            let mut body: super::OrStartStop = parse(bytes, shape)?;
            body.action = action;
            Payload::OrStartStop(body)
        }
        Shape::OrGeneric => {
            let mut body: super::OrGeneric = parse(bytes, shape)?;
            body.action = action;
            Payload::OrGeneric(body)
        }
        Shape::VnfmInstantiate => Payload::VnfmInstantiate(parse(bytes, shape)?),
        Shape::VnfmGrant => Payload::VnfmGrant(parse(bytes, shape)?),
        Shape::VnfmAllocateResources => Payload::VnfmAllocateResources(parse(bytes, shape)?),
        Shape::VnfmError => Payload::VnfmError(parse(bytes, shape)?),
        Shape::VnfmHeal => Payload::VnfmHeal(parse(bytes, shape)?),
        Shape::VnfmScaled => Payload::VnfmScaled(parse(bytes, shape)?),
        Shape::VnfmScaling => Payload::VnfmScaling(parse(bytes, shape)?),
        Shape::VnfmStartStop => {
            let mut body: super::VnfmStartStop = parse(bytes, shape)?;
            body.action = action;
            Payload::VnfmStartStop(body)
        }
        Shape::VnfmGeneric => {
            let mut body: super::VnfmGeneric = parse(bytes, shape)?;
            body.action = action;
            Payload::VnfmGeneric(body)
        }
        Shape::Unrecognized => {
            let mut fields: Map<String, Value> = parse(bytes, shape)?;
            fields.remove(ACTION_KEY);
            Payload::Unrecognized(Unrecognized { action, fields })
        }
    };

    Ok(Message::trusted(sender, payload))
}

fn parse<T: DeserializeOwned>(bytes: &[u8], shape: Shape) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::malformed(format!("body does not match {shape}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
