//! Built-in system actions, owned by the `"system"` pseudo-integration:
//! HTTP request, database query, condition branch.

mod condition;
mod database_query;
mod http_request;

pub use condition::ConditionStep;
pub use database_query::DatabaseQueryStep;
pub use http_request::HttpRequestStep;

use std::sync::Arc;
use wirecore::{
    ActionDescriptor, ConfigField, InputKind, IntegrationDescriptor, Plugin, SYSTEM_INTEGRATION,
};

pub fn plugin() -> Plugin {
    let descriptor = IntegrationDescriptor::new(
        SYSTEM_INTEGRATION,
        "System",
        "Built-in actions that need no integration setup",
    )
    .with_action(
        ActionDescriptor::new("http-request", SYSTEM_INTEGRATION, "HTTP Request")
            .with_description("Call any HTTP endpoint")
            .with_category("System")
            .with_output("status", "HTTP status code")
            .with_output("body", "Response body as text")
            .with_output("headers", "Response headers")
            .with_config_field(
                ConfigField::new("url", "URL", InputKind::TemplateInput).required(),
            )
            .with_config_field(
                ConfigField::new("method", "Method", InputKind::Text).with_default("GET"),
            )
            .with_config_field(ConfigField::new("headers", "Headers", InputKind::Textarea))
            .with_config_field(ConfigField::new(
                "body",
                "Request Body",
                InputKind::TemplateTextarea,
            )),
    )
    .with_action(
        ActionDescriptor::new("database-query", SYSTEM_INTEGRATION, "Database Query")
            .with_description("Run SQL against a SQLite database")
            .with_category("System")
            .with_output("rows", "Result rows (query operation)")
            .with_output("rowCount", "Number of rows returned")
            .with_output("rowsAffected", "Rows changed (execute operation)")
            .with_config_field(
                ConfigField::new("path", "Database Path", InputKind::Text).required(),
            )
            .with_config_field(
                ConfigField::new("query", "SQL", InputKind::TemplateTextarea).required(),
            )
            .with_config_field(
                ConfigField::new("operation", "Operation", InputKind::Text)
                    .with_default("query"),
            ),
    )
    .with_action(
        ActionDescriptor::new("condition", SYSTEM_INTEGRATION, "Condition")
            .with_description("Branch on a comparison of two values")
            .with_category("System")
            .with_output("result", "Comparison outcome")
            .with_output("branch", "\"true\" or \"false\"")
            .with_config_field(ConfigField::new(
                "left",
                "Left Value",
                InputKind::TemplateInput,
            ))
            .with_config_field(
                ConfigField::new("operator", "Operator", InputKind::Text)
                    .with_default("equals"),
            )
            .with_config_field(ConfigField::new(
                "right",
                "Right Value",
                InputKind::TemplateInput,
            )),
    );

    Plugin::new(descriptor)
        .with_step(Arc::new(HttpRequestStep::new()))
        .with_step(Arc::new(DatabaseQueryStep::new()))
        .with_step(Arc::new(ConditionStep::new()))
}
