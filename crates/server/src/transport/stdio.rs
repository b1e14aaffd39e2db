//! Newline-delimited JSON over stdin/stdout.
//!
//! Each input line is one request:
//!
//! ```text
//! {"id": 1, "method": "call_tool", "params": {"name": "txt2img", "arguments": {"prompt": "..."}}}
//! ```
//!
//! and is answered with exactly one output line carrying the same `id`:
//! `{"id", "result"}` on success, `{"id", "error": {"message", "code"}}`
//! otherwise. Requests run concurrently, so replies may arrive out of order.

use std::io;
use std::sync::Arc;

use comfymcp_tools::error::ToolError;
use comfymcp_tools::handler::ToolSet;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Invalid request: {0}")]
    Parse(serde_json::Error),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid params for {method}: {source}")]
    Params {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl RequestError {
    fn code(&self) -> &'static str {
        match self {
            Self::Tool(err) => err.code(),
            Self::Parse(_) => "PARSE_ERROR",
            Self::UnknownMethod(_) => "METHOD_NOT_FOUND",
            Self::Params { .. } => "INVALID_PARAMS",
        }
    }
}

/// Serve requests from stdin until it closes or `cancel` fires.
pub async fn serve(tools: Arc<ToolSet>, cancel: CancellationToken) -> io::Result<()> {
    tracing::info!("Serving tools over stdio");
    let mut stdout = tokio::io::stdout();
    serve_io(tools, BufReader::new(tokio::io::stdin()), &mut stdout, cancel).await?;
    tracing::info!("Stdio transport stopped");
    Ok(())
}

/// Serve requests read from `reader`, writing replies to `writer`.
///
/// Returns once the input is exhausted and every in-flight request has been
/// answered, or as soon as `cancel` fires.
pub async fn serve_io<R, W>(
    tools: Arc<ToolSet>,
    reader: R,
    writer: &mut W,
    cancel: CancellationToken,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut tx = Some(tx);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if tx.is_some() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Some(tx) = &tx {
                        let tools = Arc::clone(&tools);
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let reply = handle_line(&tools, &line).await;
                            // The receiver is gone only after cancellation.
                            let _ = tx.send(reply);
                        });
                    }
                }
                None => {
                    tracing::debug!("stdin closed, draining in-flight requests");
                    tx = None;
                }
            },
            reply = rx.recv() => match reply {
                Some(reply) => {
                    writer.write_all(reply.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                None => break,
            },
            () = cancel.cancelled() => {
                tracing::info!("Shutdown requested, closing stdio transport");
                break;
            }
        }
    }
    Ok(())
}

// ---- private helpers ----

async fn handle_line(tools: &ToolSet, line: &str) -> String {
    let (id, outcome) = match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            let id = request.id.clone();
            (id, dispatch(tools, request).await)
        }
        Err(e) => (Value::Null, Err(RequestError::Parse(e))),
    };

    let reply = match outcome {
        Ok(result) => json!({ "id": id, "result": result }),
        Err(err) => json!({
            "id": id,
            "error": { "message": err.to_string(), "code": err.code() },
        }),
    };
    reply.to_string()
}

async fn dispatch(tools: &ToolSet, request: Request) -> Result<Value, RequestError> {
    match request.method.as_str() {
        "list_tools" => Ok(json!(tools.list_tools())),
        "list_resources" => Ok(json!(tools.list_resources())),
        "call_tool" => {
            let params: CallToolParams = parse_params("call_tool", request.params)?;
            let text = tools.call_tool(&params.name, params.arguments).await?;
            Ok(Value::String(text))
        }
        "read_resource" => {
            let params: ReadResourceParams = parse_params("read_resource", request.params)?;
            let text = tools.read_resource(&params.uri).await?;
            Ok(Value::String(text))
        }
        other => Err(RequestError::UnknownMethod(other.to_string())),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    method: &'static str,
    params: Value,
) -> Result<T, RequestError> {
    serde_json::from_value(params).map_err(|source| RequestError::Params { method, source })
}
