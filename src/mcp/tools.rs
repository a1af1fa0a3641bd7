use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SheetIndexError};
use crate::format;
use crate::index::{IndexService, ReadOutcome};
use crate::mcp::types::{Tool, ToolsCallResult};

/// Tool that reads rows from one sheet; search results point callers at it.
pub const SHEET_DATA_TOOL: &str = "get_excel_sheet_data";

/// Get all tool definitions for tools/list
pub fn get_tool_definitions(max_rows: usize, default_rows: usize) -> Vec<Tool> {
    vec![
        Tool {
            name: "list_excel_files".to_string(),
            description: "List all available Excel files with their sheets, row counts and column names. Picks up new or changed files first.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: "search_in_excel_files".to_string(),
            description: "Search for a term across all indexed Excel files. Matches column names and the preview rows of every sheet, case-insensitively.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search term to look for across all Excel files"
                    }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: SHEET_DATA_TOOL.to_string(),
            description: "Read rows from a specific sheet of an Excel file, rendered as a markdown table.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Exact name of the Excel file (as shown by list_excel_files)"
                    },
                    "sheet_name": {
                        "type": "string",
                        "description": "Exact name of the sheet within the file"
                    },
                    "max_rows": {
                        "type": "integer",
                        "description": "Maximum number of rows to return",
                        "default": default_rows,
                        "minimum": 1,
                        "maximum": max_rows
                    }
                },
                "required": ["filename", "sheet_name"]
            }),
        },
        Tool {
            name: "get_excel_file_preview".to_string(),
            description: "Show the first rows of every sheet in an Excel file.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Exact name of the Excel file"
                    }
                },
                "required": ["filename"]
            }),
        },
        Tool {
            name: "refresh_excel_index".to_string(),
            description: "Rescan the Excel directory and re-index new or modified files.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

fn parse_params<T: for<'de> Deserialize<'de>>(tool: &str, arguments: &Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments)
        .map_err(|e| SheetIndexError::InvalidInput(format!("Invalid {} params: {}", tool, e)))
}

/// Handle list_excel_files tool
pub async fn handle_list_files(service: &IndexService) -> Result<ToolsCallResult> {
    let listing = service.call(|m| m.list_files()).await?;
    Ok(ToolsCallResult::text(format::format_file_listing(&listing)))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

/// Handle search_in_excel_files tool
pub async fn handle_search(service: &IndexService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: SearchParams = parse_params("search_in_excel_files", arguments)?;
    if params.query.trim().is_empty() {
        return Ok(ToolsCallResult::error("Error: query must not be empty"));
    }

    let query = params.query.clone();
    let results = service.call(move |m| Ok(m.search(&query))).await?;
    Ok(ToolsCallResult::text(format::format_search_results(
        &params.query,
        &results,
    )))
}

#[derive(Debug, Deserialize)]
struct SheetDataParams {
    filename: String,
    sheet_name: String,
    #[serde(default)]
    max_rows: Option<i64>,
}

/// Handle get_excel_sheet_data tool
pub async fn handle_sheet_data(
    service: &IndexService,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: SheetDataParams = parse_params("get_excel_sheet_data", arguments)?;
    let filename = params.filename.clone();
    let sheet = params.sheet_name.clone();

    let outcome = service
        .call(move |m| {
            let requested = params
                .max_rows
                .map(|n| n.max(0) as usize)
                .unwrap_or(m.read_config().default_rows);
            Ok(m.read_sheet_outcome(&params.filename, &params.sheet_name, requested))
        })
        .await?;

    let result = match outcome {
        ReadOutcome::Rows(rows) => {
            ToolsCallResult::text(format::format_sheet_table(&filename, &sheet, &rows))
        }
        ReadOutcome::FileNotFound => {
            ToolsCallResult::error(format!("File '{}' not found.", filename))
        }
        ReadOutcome::SheetNotFound => ToolsCallResult::error(format!(
            "Sheet '{}' not found in file '{}'.",
            sheet, filename
        )),
        ReadOutcome::Failed(reason) => ToolsCallResult::error(format!(
            "Unable to read sheet '{}' in file '{}': {}",
            sheet, filename, reason
        )),
    };
    Ok(result)
}

#[derive(Debug, Deserialize)]
struct PreviewParams {
    filename: String,
}

/// Handle get_excel_file_preview tool
pub async fn handle_preview(service: &IndexService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: PreviewParams = parse_params("get_excel_file_preview", arguments)?;
    let filename = params.filename.clone();
    let preview = service
        .call(move |m| Ok(m.file_preview(&params.filename)))
        .await?;

    Ok(match preview {
        Some(preview) => ToolsCallResult::text(format::format_preview(&filename, &preview)),
        None => ToolsCallResult::error(format!("File {} not found", filename)),
    })
}

/// Handle refresh_excel_index tool
pub async fn handle_refresh(service: &IndexService) -> Result<ToolsCallResult> {
    let (changes, total) = service
        .call(|m| {
            let changes = m.refresh()?;
            Ok((changes, m.file_count()))
        })
        .await?;
    Ok(ToolsCallResult::text(format::format_changes(&changes, total)))
}
