//! Interactive console state
//!
//! Lines come in, get parsed into commands, run against the tool facade,
//! and come back as printable text. No terminal I/O happens here.

use crate::commands::{Command, HELP, parse_command};
use crate::config::Settings;
use crate::db::QueryResult;
use crate::error::DbError;
use crate::export::{ExportFormat, to_csv, to_json};
use crate::render::{render_analysis, render_result, render_suggestions, render_table};
use crate::tools::{DatabaseTools, Submission, ToolCall, ToolDispatcher};
use serde_json::Value;

/// What the caller should do after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Print(String),
    Quit,
}

/// Console application state
pub struct App {
    dispatcher: ToolDispatcher<()>,
    format: ExportFormat,
    row_limit: usize,
    /// Ids for tool calls typed at the console
    next_call: u64,
}

impl App {
    pub fn new(tools: DatabaseTools, settings: &Settings) -> Self {
        Self {
            dispatcher: ToolDispatcher::new(tools),
            format: ExportFormat::Table,
            row_limit: settings.display_row_limit.max(1),
            next_call: 1,
        }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Prompt showing the current connection
    pub async fn prompt(&self) -> String {
        match self.tools().registry().current_name().await {
            Some(name) => format!("{}> ", name),
            None => "dbpilot> ".to_string(),
        }
    }

    /// Parse and run one line of input
    pub async fn handle_line(&mut self, line: &str) -> Action {
        if line.trim().is_empty() {
            return Action::Print(String::new());
        }
        match parse_command(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => Action::Print(format!("error: {}\n", e)),
        }
    }

    /// Run a parsed command
    pub async fn execute(&mut self, command: Command) -> Action {
        let output = match command {
            Command::Quit => return Action::Quit,
            Command::Help => Ok(format!("{}\n", HELP)),
            Command::Format(format) => {
                self.format = format;
                Ok(format!("output format: {:?}\n", format).to_lowercase())
            }
            Command::Use(name) => self
                .tools()
                .registry()
                .switch(&name)
                .await
                .map(|()| format!("now using {}\n", name)),
            Command::List => Ok(self.list().await),
            Command::Status => Ok(self.status().await),
            Command::Tables => self.tables().await,
            Command::Describe(table) => self.describe(&table).await,
            Command::Indexes(table) => self.indexes(&table).await,
            Command::Optimize(query) => self.optimize(&query).await,
            Command::Analyze(table) => self
                .tools()
                .analyze_table_performance(&table)
                .await
                .map(|a| render_analysis(&a)),
            Command::Tool { name, args } => Ok(self.tool(name, args).await),
            Command::Pending => Ok(self.pending().await),
            Command::Approve(id) => self
                .dispatcher
                .approve(&id)
                .await
                .map(|((), reply)| pretty(&reply)),
            Command::Reject(id) => self
                .dispatcher
                .reject(&id)
                .await
                .map(|((), reply)| pretty(&reply)),
            Command::Sql(sql) => self
                .tools()
                .execute_sql(&sql)
                .await
                .map(|r| self.show(&r)),
        };
        Action::Print(output.unwrap_or_else(|e| format!("error: {}\n", e)))
    }

    fn tools(&self) -> &DatabaseTools {
        self.dispatcher.tools()
    }

    /// A query result in the selected format
    fn show(&self, result: &QueryResult) -> String {
        match self.format {
            ExportFormat::Table => render_result(result, self.row_limit),
            ExportFormat::Csv => to_csv(result),
            ExportFormat::Json => format!("{}\n", to_json(result)),
        }
    }

    async fn list(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .tools()
            .registry()
            .list()
            .await
            .into_iter()
            .map(|c| {
                vec![
                    if c.is_current { "*".into() } else { String::new() },
                    c.name,
                    c.kind.to_string(),
                    c.endpoint,
                    c.status.to_string(),
                ]
            })
            .collect();
        if rows.is_empty() {
            return "No connections. Add one with `dbpilot add`.\n".to_string();
        }
        render_table(&headers(&["", "name", "type", "endpoint", "status"]), &rows)
    }

    async fn status(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .tools()
            .registry()
            .status()
            .await
            .into_iter()
            .map(|(name, status)| vec![name, status.to_string()])
            .collect();
        render_table(&headers(&["name", "status"]), &rows)
    }

    async fn tables(&self) -> Result<String, DbError> {
        let tables = self.tools().get_all_tables().await?;
        let rows: Vec<Vec<String>> = tables
            .into_iter()
            .map(|t| vec![t.schema, t.name, t.kind, t.description])
            .collect();
        Ok(render_table(
            &headers(&["schema", "name", "type", "description"]),
            &rows,
        ))
    }

    async fn describe(&self, table: &str) -> Result<String, DbError> {
        let columns = self.tools().get_table_schema(table).await?;
        let rows: Vec<Vec<String>> = columns
            .into_iter()
            .map(|c| {
                let mut keys = Vec::new();
                if c.is_primary_key {
                    keys.push("PK");
                }
                if c.is_foreign_key {
                    keys.push("FK");
                }
                vec![
                    c.name,
                    c.data_type,
                    if c.nullable { "yes" } else { "no" }.to_string(),
                    c.default_value.unwrap_or_default(),
                    keys.join(","),
                ]
            })
            .collect();
        Ok(render_table(
            &headers(&["column", "type", "nullable", "default", "key"]),
            &rows,
        ))
    }

    async fn indexes(&self, table: &str) -> Result<String, DbError> {
        let indexes = self.tools().get_table_indexes(table).await?;
        let rows: Vec<Vec<String>> = indexes
            .into_iter()
            .map(|i| {
                vec![
                    i.name,
                    i.columns.join(", "),
                    i.index_type,
                    if i.is_unique { "yes" } else { "no" }.to_string(),
                ]
            })
            .collect();
        Ok(render_table(
            &headers(&["name", "columns", "type", "unique"]),
            &rows,
        ))
    }

    async fn optimize(&self, query: &str) -> Result<String, DbError> {
        let mut out = render_suggestions(&self.tools().optimize_query(query).await?);
        match self.tools().analyze_query_performance(query).await {
            Ok(analysis) => {
                out.push('\n');
                out.push_str(&render_analysis(&analysis));
            }
            Err(e) => out.push_str(&format!("\nplan analysis unavailable: {}\n", e)),
        }
        Ok(out)
    }

    async fn tool(&mut self, name: String, arguments: Value) -> String {
        let id = format!("c{}", self.next_call);
        self.next_call += 1;
        let call = ToolCall {
            id,
            name,
            arguments,
        };
        match self.dispatcher.submit(call, ()).await {
            Submission::Completed(reply) => pretty(&reply),
            Submission::AwaitingApproval(call) => format!(
                "{} wants to run:\n{}\n/approve {} or /reject {}\n",
                call.name,
                pretty(&call.arguments).trim_end(),
                call.id,
                call.id
            ),
        }
    }

    async fn pending(&self) -> String {
        let calls = self.dispatcher.pending().await;
        if calls.is_empty() {
            return "Nothing pending.\n".to_string();
        }
        let rows: Vec<Vec<String>> = calls
            .into_iter()
            .map(|c| vec![c.id, c.name, c.arguments.to_string()])
            .collect();
        render_table(&headers(&["id", "tool", "arguments"]), &rows)
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn pretty(value: &Value) -> String {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("{}\n", text)
}
