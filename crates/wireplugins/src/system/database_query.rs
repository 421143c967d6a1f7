use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use rusqlite::Connection;
use wirecore::{FailureKind, Fields, Step, StepInput, StepResult, Value};

const DEFAULT_MAX_ROWS: usize = 1000;

/// Runs a SQL statement against a SQLite database file.
///
/// `operation` selects between `query` (returns rows) and `execute`
/// (returns the affected-row count). Row output is capped so a stray
/// `SELECT *` cannot balloon the execution context.
pub struct DatabaseQueryStep;

impl DatabaseQueryStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DatabaseQueryStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for DatabaseQueryStep {
    fn slug(&self) -> &str {
        "database-query"
    }

    async fn run(&self, input: StepInput) -> StepResult {
        let path = input.config_text("path").unwrap_or_default();
        if path.trim().is_empty() {
            return StepResult::fail(FailureKind::Validation, "No database path provided");
        }
        let query = input.config_text("query").unwrap_or_default();
        if query.trim().is_empty() {
            return StepResult::fail(FailureKind::Validation, "No query provided");
        }
        let operation = input
            .config_text("operation")
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "query".to_string());
        let max_rows = input
            .config
            .get("maxRows")
            .and_then(Value::as_f64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_ROWS);

        // rusqlite is synchronous; keep it off the executor's reactor.
        let outcome = tokio::task::spawn_blocking(move || {
            run_sql(&path, &query, &operation, max_rows)
        })
        .await;

        match outcome {
            Ok(Ok(fields)) => StepResult::Success(fields),
            Ok(Err(message)) => StepResult::fail(FailureKind::ExternalApi, message),
            Err(e) => StepResult::fail(FailureKind::Internal, format!("query task failed: {}", e)),
        }
    }
}

fn run_sql(path: &str, query: &str, operation: &str, max_rows: usize) -> Result<Fields, String> {
    let conn = Connection::open(path).map_err(|e| format!("Failed to open database: {}", e))?;

    let mut fields = Fields::new();
    match operation {
        "execute" => {
            let affected = conn
                .execute(query, [])
                .map_err(|e| format!("Query failed: {}", e))?;
            fields.insert("rowsAffected".to_string(), Value::Number(affected as f64));
        }
        "query" => {
            let mut stmt = conn
                .prepare(query)
                .map_err(|e| format!("Query failed: {}", e))?;
            let column_names: Vec<String> =
                stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt.query([]).map_err(|e| format!("Query failed: {}", e))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(|e| format!("Row read failed: {}", e))? {
                if out.len() >= max_rows {
                    break;
                }
                let mut object = std::collections::HashMap::new();
                for (i, name) in column_names.iter().enumerate() {
                    object.insert(name.clone(), column_value(row, i));
                }
                out.push(Value::Object(object));
            }
            fields.insert("rowCount".to_string(), Value::Number(out.len() as f64));
            fields.insert("rows".to_string(), Value::Array(out));
        }
        other => return Err(format!("Unknown operation '{}'", other)),
    }
    Ok(fields)
}

fn column_value(row: &rusqlite::Row<'_>, index: usize) -> Value {
    use rusqlite::types::ValueRef;
    match row.get_ref(index) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(n)) => Value::Number(n as f64),
        Ok(ValueRef::Real(n)) => Value::Number(n),
        Ok(ValueRef::Text(bytes)) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        Ok(ValueRef::Blob(bytes)) => Value::String(STANDARD.encode(bytes)),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: &str, query: &str, operation: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("path".to_string(), Value::String(path.to_string()));
        fields.insert("query".to_string(), Value::String(query.to_string()));
        fields.insert("operation".to_string(), Value::String(operation.to_string()));
        fields
    }

    #[tokio::test]
    async fn execute_then_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path = path.to_str().unwrap();

        let step = DatabaseQueryStep::new();
        let result = step
            .run(StepInput::new(config(
                path,
                "CREATE TABLE trades (mint TEXT, amount REAL)",
                "execute",
            )))
            .await;
        assert!(result.is_success());

        let result = step
            .run(StepInput::new(config(
                path,
                "INSERT INTO trades VALUES ('abc', 0.5)",
                "execute",
            )))
            .await;
        match &result {
            StepResult::Success(fields) => {
                assert_eq!(fields["rowsAffected"], Value::Number(1.0));
            }
            other => panic!("expected success, got {:?}", other),
        }

        let result = step
            .run(StepInput::new(config(path, "SELECT * FROM trades", "query")))
            .await;
        match result {
            StepResult::Success(fields) => {
                assert_eq!(fields["rowCount"], Value::Number(1.0));
                match &fields["rows"] {
                    Value::Array(rows) => match &rows[0] {
                        Value::Object(row) => {
                            assert_eq!(row["mint"], Value::String("abc".to_string()));
                            assert_eq!(row["amount"], Value::Number(0.5));
                        }
                        other => panic!("expected object row, got {:?}", other),
                    },
                    other => panic!("expected rows array, got {:?}", other),
                }
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_sql_is_failure_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let result = DatabaseQueryStep::new()
            .run(StepInput::new(config(
                path.to_str().unwrap(),
                "NOT REAL SQL",
                "query",
            )))
            .await;
        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::ExternalApi);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_query_is_validation_failure() {
        let mut fields = Fields::new();
        fields.insert("path".to_string(), Value::String("x.db".to_string()));

        let result = DatabaseQueryStep::new().run(StepInput::new(fields)).await;
        match result {
            StepResult::Failure(failure) => assert_eq!(failure.kind, FailureKind::Validation),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
