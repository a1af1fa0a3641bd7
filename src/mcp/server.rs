use crate::error::{Result, SheetIndexError};
use crate::index::IndexService;
use crate::mcp::tools;
use crate::mcp::types::*;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP server exposing the spreadsheet index as tools
pub struct McpServer {
    service: IndexService,
}

impl McpServer {
    pub fn new(service: IndexService) -> Self {
        Self { service }
    }

    /// Process one JSON-RPC request.
    ///
    /// Returns `Ok(None)` for notifications, which get no response. Handler
    /// failures are converted into JSON-RPC error responses.
    pub async fn process_mcp_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Result<Option<JsonRpcResponse>> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return Ok(None);
            }
        };

        if request.jsonrpc != "2.0" {
            return Ok(Some(JsonRpcResponse::error(
                id,
                error_codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            )));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => self.handle_shutdown(&id).await,
            _ => Ok(JsonRpcResponse::error(
                id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        };

        match response {
            Ok(resp) => Ok(Some(resp)),
            Err(e) => {
                let code = match &e {
                    SheetIndexError::InvalidInput(_) | SheetIndexError::McpProtocol(_) => {
                        error_codes::INVALID_PARAMS
                    }
                    _ => error_codes::INTERNAL_ERROR,
                };
                let mut resp = JsonRpcResponse::error(id, code, format!("Internal error: {}", e));
                if let JsonRpcResponsePayload::Error { error } = &mut resp.payload {
                    if code == error_codes::INVALID_PARAMS {
                        error.message = e.to_string();
                    }
                    error.data = Some(serde_json::json!({ "details": e.to_string() }));
                }
                Ok(Some(resp))
            }
        }
    }

    /// Run the MCP server on stdin/stdout
    pub async fn run(&self) -> Result<()> {
        let stdin = AsyncBufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        log::info!(
            "sheetindex MCP server v{} starting on stdio",
            env!("CARGO_PKG_VERSION")
        );
        self.serve(stdin, stdout).await?;
        log::info!("MCP server shutting down");
        Ok(())
    }

    /// Serve newline-delimited JSON-RPC over any reader/writer pair until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        let mut initialized = false;

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await.map_err(|e| {
                SheetIndexError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read from stdin: {}", e),
                ))
            })?;

            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    log::warn!("Discarding malformed JSON-RPC message: {}", e);
                    let id = extract_id_from_line(trimmed).unwrap_or(Value::Null);
                    let error_response = JsonRpcResponse::error(
                        id,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                    );
                    send_response(&mut writer, &error_response).await?;
                    continue;
                }
            };

            match self.process_mcp_request(request, &mut initialized).await {
                Ok(Some(response)) => send_response(&mut writer, &response).await?,
                Ok(None) => {
                    if initialized {
                        log::debug!("Client initialized");
                    }
                }
                Err(e) => log::error!("Unexpected error in process_mcp_request: {}", e),
            }
        }

        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or(serde_json::json!({})))
                .map_err(|e| SheetIndexError::McpProtocol(format!("Invalid initialize params: {}", e)))?;

        if let Some(client) = &params.client_info {
            log::info!("MCP client connected: {}", client);
        }

        let protocol_version = if params.protocol_version.is_empty() {
            "2024-11-05".to_string()
        } else {
            params.protocol_version.clone()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "sheetindex".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::result(id.clone(), serde_json::to_value(&result)?))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let read = self.service.manager().read_config();
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(read.max_rows, read.default_rows),
        };
        Ok(JsonRpcResponse::result(id.clone(), serde_json::to_value(&result)?))
    }

    async fn handle_tools_call(
        &self,
        id: &JsonRpcId,
        params: &Option<Value>,
    ) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(params.clone().ok_or_else(|| {
            SheetIndexError::McpProtocol("Missing params for tools/call".to_string())
        })?)
        .map_err(|e| SheetIndexError::McpProtocol(format!("Invalid tools/call params: {}", e)))?;

        log::debug!("tools/call {}", params.name);
        let result = match params.name.as_str() {
            "list_excel_files" => tools::handle_list_files(&self.service).await?,
            "search_in_excel_files" => tools::handle_search(&self.service, &params.arguments).await?,
            "get_excel_sheet_data" => {
                tools::handle_sheet_data(&self.service, &params.arguments).await?
            }
            "get_excel_file_preview" => {
                tools::handle_preview(&self.service, &params.arguments).await?
            }
            "refresh_excel_index" => tools::handle_refresh(&self.service).await?,
            _ => {
                return Ok(JsonRpcResponse::error(
                    id.clone(),
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", params.name),
                ));
            }
        };

        Ok(JsonRpcResponse::result(id.clone(), serde_json::to_value(&result)?))
    }

    /// Persist the index and acknowledge.
    async fn handle_shutdown(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        self.service.call(|m| m.shutdown()).await?;
        Ok(JsonRpcResponse::result(id.clone(), Value::Null))
    }
}

/// Write one newline-delimited JSON-RPC response
async fn send_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Best-effort id recovery from a line that failed to parse
fn extract_id_from_line(line: &str) -> Option<Value> {
    let id_start = line.find(r#""id":"#)?;
    let rest = &line[id_start + 5..];
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    let raw = rest[..end].trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(Value::String(raw[1..raw.len() - 1].to_string()))
    } else {
        raw.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::index::IndexManager;
    use crate::workbook::fixtures::{Cell, XlsxBuilder};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> McpServer {
        let data = dir.path().join("files");
        std::fs::create_dir_all(&data).unwrap();
        XlsxBuilder::new()
            .sheet(
                "Rent Roll",
                vec![
                    vec![Cell::s("Unit"), Cell::s("Tenant")],
                    vec![Cell::s("101"), Cell::s("Acme Corp")],
                ],
            )
            .write(&data.join("rent_roll.xlsx"));
        let manager = IndexManager::open(&Config::for_directory(&data)).unwrap();
        McpServer::new(IndexService::new(Arc::new(manager)))
    }

    fn request(value: Value) -> JsonRpcRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_id_from_line() {
        let line = r#"{"jsonrpc":"2.0","id":"test-123","method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(Value::String("test-123".to_string())));

        let line = r#"{"jsonrpc":"2.0","id":42,"method":"test"}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(42)));

        let line = r#"{"jsonrpc":"2.0","id":9}"#;
        assert_eq!(extract_id_from_line(line), Some(json!(9)));

        assert_eq!(extract_id_from_line("garbage"), None);
    }

    #[tokio::test]
    async fn test_initialize_and_tools_list() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let mut initialized = false;

        let resp = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": {"protocolVersion": "2024-11-05", "capabilities": {}}})),
                &mut initialized,
            )
            .await
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["result"]["serverInfo"]["name"], "sheetindex");

        let none = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
                &mut initialized,
            )
            .await
            .unwrap();
        assert!(none.is_none());
        assert!(initialized);

        let resp = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})),
                &mut initialized,
            )
            .await
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_tools_call_dispatch_and_errors() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let mut initialized = true;

        let resp = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                    "params": {"name": "search_in_excel_files", "arguments": {"query": "acme"}}})),
                &mut initialized,
            )
            .await
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&resp).unwrap();
        let text = value["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Column 'Tenant': 'Acme Corp'"));

        let resp = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                    "params": {"name": "no_such_tool"}})),
                &mut initialized,
            )
            .await
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], error_codes::INVALID_PARAMS);

        let resp = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                    "params": {"name": "get_excel_sheet_data", "arguments": {"filename": "x"}}})),
                &mut initialized,
            )
            .await
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], error_codes::INVALID_PARAMS);

        let resp = server
            .process_mcp_request(
                request(json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"})),
                &mut initialized,
            )
            .await
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_over_stream() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"refresh_excel_index"}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#,
            "\n"
        );
        let mut output = Vec::new();
        server
            .serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0]["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Index is up to date"));
        assert_eq!(lines[1]["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(lines[1]["id"], Value::Null);
        assert_eq!(lines[2]["result"], Value::Null);
    }
}
