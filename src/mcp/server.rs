use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::handlers::RequestHandler;
use super::types::*;

const SERVER_NAME: &str = "slack-mcp-server";
const MAX_EMPTY_READS: u32 = 3;

pub struct McpServer {
    handler: RequestHandler,
    initialized: RwLock<bool>,
}

impl McpServer {
    pub fn new(handler: RequestHandler) -> Self {
        Self {
            handler,
            initialized: RwLock::new(false),
        }
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);

        let mut buffer = String::new();
        let mut empty_reads = 0;

        loop {
            buffer.clear();

            match reader.read_line(&mut buffer).await {
                Ok(0) => {
                    empty_reads += 1;

                    // Give it a few chances before exiting
                    if empty_reads > MAX_EMPTY_READS {
                        break;
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    continue;
                }
                Ok(_) => {
                    empty_reads = 0;
                    let trimmed = buffer.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match self.process_request(trimmed).await {
                        Ok(Some(response)) => response,
                        // Notification, no response needed
                        Ok(None) => continue,
                        Err(e) => {
                            error!("Error processing request: {}", e);
                            JsonRpcResponse::error(
                                None,
                                JsonRpcError::internal_error(e.to_string()),
                            )
                        }
                    };

                    let response_str = serde_json::to_string(&response)?;
                    stdout.write_all(response_str.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn process_request(&self, input: &str) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(input) {
            Ok(req) => req,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return Ok(Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(),
                )));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Ok(Some(JsonRpcResponse::error(
                request.id.clone(),
                JsonRpcError::invalid_request(),
            )));
        }

        debug!(method = %request.method, "Handling request");

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request).await.map(Some),
            "initialized" | "notifications/initialized" => self.handle_initialized(request).await,
            "ping" => Ok(Some(JsonRpcResponse::success(request.id, json!({})))),
            "tools/list" => self.handle_list_tools(request).await.map(Some),
            "tools/call" => self.handle_call_tool(request).await.map(Some),
            "prompts/list" => Ok(Some(JsonRpcResponse::success(
                request.id,
                json!({ "prompts": [] }),
            ))),
            "resources/list" => Ok(Some(JsonRpcResponse::success(
                request.id,
                json!({ "resources": [] }),
            ))),
            method if method.starts_with("notifications/") => Ok(None),
            _ => {
                warn!("Unknown method: {}", request.method);
                Ok(Some(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::method_not_found(&request.method),
                )))
            }
        }
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let params: InitializeRequest = match request_params(&request) {
            Ok(params) => params,
            Err(error) => return Ok(JsonRpcResponse::error(request.id, error)),
        };

        let protocol_version = if params.protocol_version.starts_with("2025") {
            PROTOCOL_VERSION_2025
        } else {
            PROTOCOL_VERSION
        };

        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                version = %client.version,
                protocol = protocol_version,
                "Client connected"
            );
        }

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: PeerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    async fn handle_initialized(&self, request: JsonRpcRequest) -> Result<Option<JsonRpcResponse>> {
        *self.initialized.write().await = true;

        // Notifications don't get responses
        Ok(request
            .id
            .is_some()
            .then(|| JsonRpcResponse::success(request.id, Value::Null)))
    }

    async fn ensure_initialized(&self) -> Result<(), JsonRpcError> {
        if *self.initialized.read().await {
            Ok(())
        } else {
            Err(JsonRpcError::internal_error("Server not initialized"))
        }
    }

    async fn handle_list_tools(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if let Err(error) = self.ensure_initialized().await {
            return Ok(JsonRpcResponse::error(request.id, error));
        }

        let result = ListToolsResult {
            tools: self.handler.list_tools(),
        };

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    async fn handle_call_tool(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if let Err(error) = self.ensure_initialized().await {
            return Ok(JsonRpcResponse::error(request.id, error));
        }

        let params: CallToolRequest = match request_params(&request) {
            Ok(params) => params,
            Err(error) => return Ok(JsonRpcResponse::error(request.id, error)),
        };

        // Tool failures are already rendered as text content
        let result = self.handler.call_tool(&params.name, params.arguments).await;

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }
}

fn request_params<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    let params = request
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}
