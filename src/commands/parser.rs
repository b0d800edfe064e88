//! Command parsing
//!
//! Parses one line of console input into a structured [`Command`].
//! Commands use a `/` prefix (e.g., `/help`, `/quit`); anything else is SQL.

use crate::error::{CommandError, CommandResult};
use crate::export::ExportFormat;
use serde_json::Value;

/// Commands understood by the interactive console
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch the current connection
    Use(String),

    /// List registered connections
    List,

    /// Health of every connection
    Status,

    /// Tables and views of the current database
    Tables,

    /// Columns of a table
    Describe(String),

    /// Indexes of a table
    Indexes(String),

    /// Static rewrite suggestions plus a full analysis of a query
    Optimize(String),

    /// Table-scoped performance analysis
    Analyze(String),

    /// Invoke a tool by name with JSON arguments
    Tool { name: String, args: Value },

    /// Tool calls waiting for confirmation
    Pending,

    /// Run a parked tool call
    Approve(String),

    /// Drop a parked tool call
    Reject(String),

    /// Output format for query results
    Format(ExportFormat),

    /// Show help
    Help,

    /// Quit the application
    Quit,

    /// Plain SQL to execute
    Sql(String),
}

/// Parse a console line into a Command
pub fn parse_command(input: &str) -> CommandResult<Command> {
    let input = input.trim();
    let Some(body) = input.strip_prefix('/') else {
        if input.is_empty() {
            return Err(CommandError::Unknown(String::new()));
        }
        return Ok(Command::Sql(input.to_string()));
    };

    let (head, rest) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };

    match head {
        "use" | "u" => required(rest, "connection name").map(Command::Use),
        "list" | "ls" => Ok(Command::List),
        "status" | "st" => Ok(Command::Status),
        "tables" | "dt" => Ok(Command::Tables),
        "describe" | "d" => required(rest, "table name").map(Command::Describe),
        "indexes" | "di" => required(rest, "table name").map(Command::Indexes),
        "optimize" | "o" => required(rest, "query").map(Command::Optimize),
        "analyze" | "a" => required(rest, "table name").map(Command::Analyze),
        "tool" | "t" => parse_tool(rest),
        "pending" => Ok(Command::Pending),
        "approve" | "y" => required(rest, "call id").map(Command::Approve),
        "reject" | "n" => required(rest, "call id").map(Command::Reject),
        "format" | "f" => parse_format(rest),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        unknown => Err(CommandError::Unknown(unknown.to_string())),
    }
}

fn required(rest: &str, what: &'static str) -> CommandResult<String> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument(what))
    } else {
        Ok(rest.to_string())
    }
}

/// `/tool <name> [json]`; missing arguments mean `{}`
fn parse_tool(rest: &str) -> CommandResult<Command> {
    let (name, json) = match rest.split_once(char::is_whitespace) {
        Some((name, json)) => (name, json.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return Err(CommandError::MissingArgument("tool name"));
    }
    let args = if json.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(json)
            .map_err(|e| CommandError::InvalidArgument(format!("tool arguments: {e}")))?
    };
    Ok(Command::Tool {
        name: name.to_string(),
        args,
    })
}

fn parse_format(rest: &str) -> CommandResult<Command> {
    match rest.to_ascii_lowercase().as_str() {
        "table" => Ok(Command::Format(ExportFormat::Table)),
        "csv" => Ok(Command::Format(ExportFormat::Csv)),
        "json" => Ok(Command::Format(ExportFormat::Json)),
        "" => Err(CommandError::MissingArgument("format")),
        other => Err(CommandError::InvalidArgument(format!(
            "unknown format '{other}' (table, csv, json)"
        ))),
    }
}

/// Console help text
pub const HELP: &str = "\
/use <name>          switch the current connection
/list                registered connections
/status              connection health
/tables              tables and views
/describe <table>    columns of a table
/indexes <table>     indexes of a table
/optimize <query>    rewrite hints and plan analysis
/analyze <table>     table performance analysis
/tool <name> [json]  invoke a tool
/pending             tool calls awaiting confirmation
/approve <id>        run a pending call
/reject <id>         drop a pending call
/format <fmt>        table, csv or json
/help                this text
/quit                leave
anything else runs as SQL";
