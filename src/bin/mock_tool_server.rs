//! Scripted MCP server speaking newline-delimited JSON-RPC over stdio.
//!
//! Usage:
//!
//! ```text
//! mock-tool-server [--mode echo|mute-calls|exit|reversed] [--tools a,b,c] [--batch <n>]
//! ```
//!
//! Every mode answers the handshake, `tools/list` and `ping`. The mode only
//! changes how `tools/call` is handled:
//!
//! - `echo` replies with the call arguments as text and structured content.
//! - `mute-calls` never replies.
//! - `exit` terminates the process with status 3 on the first call.
//! - `reversed` holds calls until `--batch` are pending, then replies to
//!   them last-first.

use conduit::tool_server::protocol::{
    METHOD_NOT_FOUND, PROTOCOL_VERSION, error_response, methods, result_response,
};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_TOOLS: &str = "echo";
const DEFAULT_BATCH: usize = 2;
const CALL_EXIT_STATUS: i32 = 3;

#[derive(Debug, Error)]
enum MockError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("stdio failure: {0}")]
    Io(#[from] io::Error),
    #[error("could not encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Echo,
    MuteCalls,
    Exit,
    Reversed,
}

impl Mode {
    fn parse(value: &str) -> Result<Self, MockError> {
        match value {
            "echo" => Ok(Self::Echo),
            "mute-calls" => Ok(Self::MuteCalls),
            "exit" => Ok(Self::Exit),
            "reversed" => Ok(Self::Reversed),
            other => Err(MockError::InvalidArgs(format!("unknown mode '{other}'"))),
        }
    }
}

#[derive(Debug)]
struct Script {
    mode: Mode,
    tools: Vec<String>,
    batch: usize,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Script, MockError> {
    let mut script = Script {
        mode: Mode::Echo,
        tools: split_tools(DEFAULT_TOOLS),
        batch: DEFAULT_BATCH,
    };
    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| MockError::InvalidArgs(format!("{flag} needs a value")))?;
        match flag.as_str() {
            "--mode" => script.mode = Mode::parse(&value)?,
            "--tools" => script.tools = split_tools(&value),
            "--batch" => {
                script.batch = value
                    .parse()
                    .map_err(|_| MockError::InvalidArgs(format!("bad --batch '{value}'")))?;
            }
            other => return Err(MockError::InvalidArgs(format!("unknown flag {other}"))),
        }
    }
    Ok(script)
}

fn split_tools(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn tool_list(tools: &[String]) -> Value {
    let entries: Vec<Value> = tools
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "description": format!("mock tool {name}"),
                "inputSchema": {"type": "object"}
            })
        })
        .collect();
    json!({"tools": entries})
}

fn echo_result(arguments: &Value) -> Value {
    json!({
        "content": [{"type": "text", "text": arguments.to_string()}],
        "structuredContent": arguments,
        "isError": false
    })
}

struct MockServer<W> {
    script: Script,
    out: W,
    held: Vec<(Value, Value)>,
}

impl<W: Write> MockServer<W> {
    fn send(&mut self, frame: &Value) -> Result<(), MockError> {
        serde_json::to_writer(&mut self.out, frame)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    fn handle(&mut self, frame: &Value) -> Result<(), MockError> {
        let Some(method) = frame.get("method").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(id) = frame.get("id").cloned() else {
            return Ok(());
        };
        let params = frame.get("params").cloned().unwrap_or(Value::Null);
        let reply = match method {
            methods::INITIALIZE => result_response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {"listChanged": true}},
                    "serverInfo": {"name": "mock-tool-server", "version": env!("CARGO_PKG_VERSION")}
                }),
            ),
            methods::TOOLS_LIST => result_response(id, tool_list(&self.script.tools)),
            methods::PING => result_response(id, json!({})),
            methods::TOOLS_CALL => return self.call(id, &params),
            _ => error_response(id, METHOD_NOT_FOUND, "method not supported"),
        };
        self.send(&reply)
    }

    fn call(&mut self, id: Value, params: &Value) -> Result<(), MockError> {
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        match self.script.mode {
            Mode::Echo => self.send(&result_response(id, echo_result(&arguments))),
            Mode::MuteCalls => Ok(()),
            Mode::Exit => {
                writeln!(io::stderr(), "exiting on tools/call as scripted")?;
                std::process::exit(CALL_EXIT_STATUS);
            }
            Mode::Reversed => {
                self.held.push((id, arguments));
                if self.held.len() < self.script.batch {
                    return Ok(());
                }
                let mut held = std::mem::take(&mut self.held);
                while let Some((held_id, held_arguments)) = held.pop() {
                    self.send(&result_response(held_id, echo_result(&held_arguments)))?;
                }
                Ok(())
            }
        }
    }
}

fn serve(script: Script) -> Result<(), MockError> {
    writeln!(io::stderr(), "mock tool server ready ({:?})", script.mode)?;
    let mut server = MockServer {
        script,
        out: io::stdout().lock(),
        held: Vec::new(),
    };
    for line in io::stdin().lock().lines() {
        let text = line?;
        if text.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(frame) => server.handle(&frame)?,
            Err(err) => writeln!(io::stderr(), "ignoring malformed frame: {err}")?,
        }
    }
    Ok(())
}

fn main() -> Result<(), BoxError> {
    let script = parse_args(std::env::args().skip(1))?;
    serve(script)?;
    Ok(())
}
