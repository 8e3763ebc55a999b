//! Inbound RPC command dispatch.
//!
//! Requests arrive as `{"method":"<name>","params":{...}}`. The method name
//! is peeked without a full parse, looked up in a fixed handler table, and
//! only then is the payload decoded against that handler's schema. Anything
//! that does not match a registered shape is logged and dropped.
//!
//! | method       | params                      | effect                              |
//! |--------------|-----------------------------|-------------------------------------|
//! | `set-output` | `{"ledno":u8,"value":bool}` | drive one output                    |
//! | `get-output` | `{"ledno":u8}`              | reply `{"ledno":n,"value":b}`       |

use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::link::InboundCommand;
use super::outbox::Outbox;
use super::payload::OutputReport;
use super::queue::Topic;
use crate::app::ports::OutputPort;
use crate::error::CommandError;

/// Longest method name the peek accepts.
pub const METHOD_NAME_MAX: usize = 32;

/// Everything a handler may touch.
pub struct CommandContext<'a, O> {
    pub outputs: &'a mut O,
    pub outbox: &'a Outbox,
    pub request_id: Option<u32>,
}

type Handler<O> = fn(&[u8], &mut CommandContext<'_, O>) -> Result<(), CommandError>;

fn handlers<O: OutputPort>() -> [(&'static str, Handler<O>); 2] {
    [("set-output", set_output::<O>), ("get-output", get_output::<O>)]
}

/// Route one command. Unknown methods come back as
/// [`CommandError::UnknownCommand`] and are expected to be ignored.
pub fn dispatch<O: OutputPort>(
    command: &InboundCommand,
    ctx: &mut CommandContext<'_, O>,
) -> Result<(), CommandError> {
    let payload = command.payload.as_slice();
    let Some(method) = peek_method(payload) else {
        debug!("rpc: no method in {} B payload, ignored", payload.len());
        return Err(CommandError::UnknownCommand);
    };

    let Some((_, handler)) = handlers::<O>().into_iter().find(|(name, _)| *name == method) else {
        debug!("rpc: unknown method '{method}', ignored");
        return Err(CommandError::UnknownCommand);
    };

    handler(payload, ctx).inspect_err(|e| warn!("rpc: {method} rejected: {e}"))
}

/// Find the value of the top-level `"method"` key without decoding the
/// whole document. Strings and nested objects are skipped, so a `"method"`
/// inside `params` or a string value never matches. Returns `None` when the
/// key is absent, the value is not a plain string, or it exceeds
/// [`METHOD_NAME_MAX`] bytes.
pub fn peek_method(payload: &[u8]) -> Option<&str> {
    let mut depth = 0usize;
    // Last structural byte seen outside a string.
    let mut prev = 0u8;
    let mut i = 0;

    while i < payload.len() {
        let b = payload[i];
        match b {
            b'"' => {
                let end = string_end(payload, i + 1)?;
                let is_key = depth == 1 && matches!(prev, b'{' | b',');
                if is_key && &payload[i + 1..end] == b"method" {
                    return method_value(&payload[end + 1..]);
                }
                prev = b'"';
                i = end + 1;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.checked_sub(1)?,
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            prev = b;
        }
        i += 1;
    }
    None
}

/// Index of the quote closing a string whose body starts at `from`.
fn string_end(payload: &[u8], mut from: usize) -> Option<usize> {
    loop {
        match payload.get(from)? {
            b'\\' => from += 2,
            b'"' => return Some(from),
            _ => from += 1,
        }
    }
}

fn method_value(after_key: &[u8]) -> Option<&str> {
    let mut rest = skip_ws(after_key);
    rest = skip_ws(rest.strip_prefix(b":")?);
    rest = rest.strip_prefix(b"\"")?;

    let end = rest.iter().take(METHOD_NAME_MAX + 1).position(|&b| b == b'"')?;
    let name = &rest[..end];
    if name.contains(&b'\\') {
        return None;
    }
    core::str::from_utf8(name).ok()
}

fn skip_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    &bytes[start..]
}

// ── Schemas ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct Request<P> {
    #[allow(dead_code)]
    method: heapless::String<METHOD_NAME_MAX>,
    params: P,
}

#[derive(Deserialize)]
struct SetOutputParams {
    ledno: u8,
    value: bool,
}

#[derive(Deserialize)]
struct GetOutputParams {
    ledno: u8,
}

fn decode<P: DeserializeOwned>(payload: &[u8]) -> Result<P, CommandError> {
    serde_json::from_slice::<Request<P>>(payload)
        .map(|req| req.params)
        .map_err(|e| {
            warn!("rpc: decode failed: {e}");
            CommandError::MalformedMessage
        })
}

fn check_channel<O: OutputPort>(outputs: &O, ledno: u8) -> Result<usize, CommandError> {
    let index = ledno as usize;
    if index < outputs.channel_count() {
        Ok(index)
    } else {
        Err(CommandError::InvalidChannel(ledno))
    }
}

// ── Handlers ─────────────────────────────────────────────────

fn set_output<O: OutputPort>(payload: &[u8], ctx: &mut CommandContext<'_, O>) -> Result<(), CommandError> {
    let params: SetOutputParams = decode(payload)?;
    let index = check_channel(ctx.outputs, params.ledno)?;
    ctx.outputs.set_channel(index, params.value);
    info!("rpc: output {} -> {}", params.ledno, if params.value { "on" } else { "off" });
    Ok(())
}

fn get_output<O: OutputPort>(payload: &[u8], ctx: &mut CommandContext<'_, O>) -> Result<(), CommandError> {
    let params: GetOutputParams = decode(payload)?;
    let index = check_channel(ctx.outputs, params.ledno)?;
    let report = OutputReport {
        ledno: params.ledno,
        value: ctx.outputs.get_channel(index),
    };

    let Some(id) = ctx.request_id else {
        debug!("rpc: get-output without request id, no reply sent");
        return Ok(());
    };
    ctx.outbox
        .publish_json(Topic::RpcResponse(id), &report)
        .map_err(CommandError::Reply)
}
