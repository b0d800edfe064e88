//! Tool catalog
//!
//! The declarative list of tools the LLM layer may call, each with a JSON
//! Schema for its parameters.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

/// Parameter schema builder
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub type_: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self {
            type_: "object".to_string(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        type_: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut prop = Map::new();
        prop.insert("type".to_string(), Value::String(type_.into()));
        prop.insert("description".to_string(), Value::String(description.into()));

        self.properties.insert(name.into(), Value::Object(prop));
        self
    }

    /// An array property whose items are all `item_type`
    pub fn array_property(
        mut self,
        name: impl Into<String>,
        item_type: impl Into<String>,
        description: impl Into<String>,
        min_items: usize,
    ) -> Self {
        let prop = json!({
            "type": "array",
            "items": { "type": item_type.into() },
            "minItems": min_items,
            "description": description.into(),
        });
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn build(self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String(self.type_));
        schema.insert("properties".to_string(), Value::Object(self.properties));
        schema.insert(
            "required".to_string(),
            Value::Array(self.required.into_iter().map(Value::String).collect()),
        );

        Value::Object(schema)
    }
}

impl Default for ToolSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// One callable tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
    /// May change data; the caller should confirm before running it
    pub risky: bool,
}

impl ToolSpec {
    fn new(name: &'static str, description: &'static str, parameters: ToolSchema) -> Self {
        Self {
            name,
            description,
            parameters: parameters.build(),
            risky: false,
        }
    }

    fn risky(mut self) -> Self {
        self.risky = true;
        self
    }

    /// `{"type": "function", "function": {name, description, parameters}}`
    pub fn to_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

fn table_param() -> ToolSchema {
    ToolSchema::new()
        .property("tableName", "string", "Table name, optionally schema-qualified")
        .required("tableName")
}

fn sql_param(name: &str, description: &str) -> ToolSchema {
    ToolSchema::new()
        .property(name, "string", description)
        .required(name)
}

static CATALOG: LazyLock<Vec<ToolSpec>> = LazyLock::new(|| {
    vec![
        ToolSpec::new(
            "execute_sql",
            "Execute a SQL statement on the current database and return its rows",
            sql_param("sql", "The SQL statement to execute"),
        )
        .risky(),
        ToolSpec::new(
            "get_all_tables",
            "List every table and view in the current database",
            ToolSchema::new(),
        ),
        ToolSpec::new(
            "get_table_schema",
            "Describe the columns of a table: types, nullability, defaults, keys",
            table_param(),
        ),
        ToolSpec::new(
            "explain_query",
            "Show the execution plan for a SQL statement",
            sql_param("sql", "The SQL statement to explain"),
        ),
        ToolSpec::new(
            "get_table_indexes",
            "List the indexes on a table with their key columns",
            table_param(),
        ),
        ToolSpec::new(
            "get_table_stats",
            "Row count, size and activity counters for a table",
            table_param(),
        ),
        ToolSpec::new(
            "find_duplicate_data",
            "Find rows that share the same values in the given columns",
            table_param().array_property(
                "columns",
                "string",
                "Columns whose combined values should be unique",
                1,
            )
            .required("columns"),
        ),
        ToolSpec::new(
            "get_slow_queries",
            "Slowest statements by mean execution time (PostgreSQL, needs pg_stat_statements)",
            ToolSchema::new(),
        ),
        ToolSpec::new(
            "get_database_size",
            "Total size of the current database",
            ToolSchema::new(),
        ),
        ToolSpec::new(
            "get_table_sizes",
            "Size and row count of every table",
            ToolSchema::new(),
        ),
        ToolSpec::new(
            "get_active_connections",
            "Sessions currently connected to the database",
            ToolSchema::new(),
        ),
        ToolSpec::new(
            "analyze_query_performance",
            "Explain a query, look for scans and spills, and score the result",
            sql_param("query", "The SQL query to analyze"),
        ),
        ToolSpec::new(
            "suggest_indexes",
            "Suggest missing indexes for a table",
            table_param(),
        ),
        ToolSpec::new(
            "get_query_patterns",
            "Recurring statements classified as slow, frequent or complex",
            ToolSchema::new(),
        ),
        ToolSpec::new(
            "optimize_query",
            "Check a query against common anti-patterns without running it",
            sql_param("query", "The SQL query to check"),
        ),
        ToolSpec::new(
            "analyze_table_performance",
            "Combine a table's statistics, index suggestions and bottlenecks",
            table_param(),
        ),
    ]
});

/// Every tool, in presentation order
pub fn catalog() -> &'static [ToolSpec] {
    &CATALOG
}

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    CATALOG.iter().find(|t| t.name == name)
}

/// The whole catalog in function-calling format
pub fn function_definitions() -> Value {
    Value::Array(CATALOG.iter().map(ToolSpec::to_function).collect())
}
