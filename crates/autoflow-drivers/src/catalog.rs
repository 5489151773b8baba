//! Standard driver set.
//!
//! Registers the HTTP driver plus dry-run stand-ins for the services the
//! built-in templates target (email, project board, document store, content
//! generation, file export, payments, notifications).  Deployments with real
//! credentials register their own implementations under the same names.

use std::sync::Arc;

use autoflow_kernel::{Driver, DriverRegistry, OperationSpec};

use crate::dry_run::DryRunDriver;
use crate::http::HttpDriver;

/// Dry-run drivers for every service the built-in templates use.
pub fn standard_drivers() -> Vec<Arc<dyn Driver>> {
    vec![
        Arc::new(DryRunDriver::new(
            "email",
            "Outbound email",
            vec![
                OperationSpec::new("send", "Send an email")
                    .require(["to", "subject", "body"])
                    .optional(["cc", "bcc"]),
            ],
        )),
        Arc::new(DryRunDriver::new(
            "tasks",
            "Project board",
            vec![
                OperationSpec::new("create_task", "Create a task on a project board")
                    .require(["name", "project"])
                    .optional(["description", "due_date", "assignee"]),
                OperationSpec::new("update_task", "Update an existing task")
                    .require(["task_id"])
                    .optional(["status", "assignee", "due_date"]),
            ],
        )),
        Arc::new(DryRunDriver::new(
            "documents",
            "Document store",
            vec![
                OperationSpec::new("create_document", "Create a document")
                    .require(["title", "content"])
                    .optional(["folder"]),
            ],
        )),
        Arc::new(DryRunDriver::new(
            "content",
            "Text generation",
            vec![
                OperationSpec::new("generate", "Draft content on a topic")
                    .require(["topic"])
                    .optional(["tone", "length"]),
            ],
        )),
        Arc::new(DryRunDriver::new(
            "data",
            "Data export and query",
            vec![
                OperationSpec::new("export_report", "Export a report file")
                    .require(["source"])
                    .optional(["format"]),
                OperationSpec::new("query", "Run a query against a source")
                    .require(["source", "query"]),
            ],
        )),
        Arc::new(DryRunDriver::new(
            "payments",
            "Payment processor",
            vec![
                OperationSpec::new("create_invoice", "Issue an invoice")
                    .require(["customer", "amount"])
                    .optional(["currency", "description"]),
            ],
        )),
        Arc::new(DryRunDriver::new(
            "notify",
            "Chat notifications",
            vec![
                OperationSpec::new("send", "Post a notification")
                    .require(["message"])
                    .optional(["channel"]),
            ],
        )),
        Arc::new(HttpDriver::new()),
    ]
}

/// A registry holding [`standard_drivers`].
pub fn standard_registry() -> autoflow_kernel::Result<DriverRegistry> {
    standard_drivers()
        .into_iter()
        .try_fold(DriverRegistry::builder(), |builder, driver| {
            builder.register(driver)
        })
        .map(|builder| builder.build())
}
