use std::sync::Arc;

use futures::future::BoxFuture;
use rusqlite::{params, OptionalExtension};

use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::graph::{WorkflowDocument, WorkflowGraph, WorkflowScope, WorkflowSummary};
use genmedia_core::traits::WorkflowRepository;

use crate::db::{db_err, format_ts, parse_ts, Database};

/// Workflows as rows, with the graph kept verbatim as a JSON column.
pub struct SqliteWorkflowRepository {
    db: Arc<Database>,
}

impl SqliteWorkflowRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn not_found() -> GenmediaError {
    GenmediaError::NotFound("Workflow not found".into())
}

impl WorkflowRepository for SqliteWorkflowRepository {
    fn load(&self, workflow_id: &str) -> BoxFuture<'_, Result<WorkflowDocument>> {
        let workflow_id = workflow_id.to_string();
        Box::pin(async move {
            let conn = self.db.lock()?;
            let row = conn
                .query_row(
                    "SELECT id, name, description, is_public, thumbnail_ref, owner_id,
                            owner_email, graph, created_at, updated_at
                     FROM workflows WHERE id = ?1",
                    params![workflow_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, bool>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, String>(8)?,
                            row.get::<_, String>(9)?,
                        ))
                    },
                )
                .optional()
                .map_err(db_err)?
                .ok_or_else(not_found)?;

            let (
                id,
                name,
                description,
                is_public,
                thumbnail_ref,
                owner_id,
                owner_email,
                graph,
                created,
                updated,
            ) = row;
            let graph: WorkflowGraph = serde_json::from_str(&graph)?;

            Ok(WorkflowDocument {
                id,
                name,
                description,
                is_public,
                thumbnail_ref,
                created_at: parse_ts(&created),
                updated_at: parse_ts(&updated),
                owner_id,
                owner_email,
                graph,
            })
        })
    }

    fn save(&self, workflow: &WorkflowDocument) -> BoxFuture<'_, Result<()>> {
        let workflow = workflow.clone();
        Box::pin(async move {
            let graph = serde_json::to_string(&workflow.graph)?;
            let conn = self.db.lock()?;
            conn.execute(
                "INSERT INTO workflows
                    (id, name, description, is_public, thumbnail_ref, owner_id, owner_email,
                     node_count, edge_count, graph, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    is_public = excluded.is_public,
                    thumbnail_ref = excluded.thumbnail_ref,
                    node_count = excluded.node_count,
                    edge_count = excluded.edge_count,
                    graph = excluded.graph,
                    updated_at = excluded.updated_at",
                params![
                    workflow.id,
                    workflow.name,
                    workflow.description,
                    workflow.is_public,
                    workflow.thumbnail_ref,
                    workflow.owner_id,
                    workflow.owner_email,
                    workflow.graph.nodes.len() as i64,
                    workflow.graph.edges.len() as i64,
                    graph,
                    format_ts(&workflow.created_at),
                    format_ts(&workflow.updated_at),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn check_ownership(&self, workflow_id: &str, caller_id: &str) -> BoxFuture<'_, Result<bool>> {
        let workflow_id = workflow_id.to_string();
        let caller_id = caller_id.to_string();
        Box::pin(async move {
            let conn = self.db.lock()?;
            let owner: String = conn
                .query_row(
                    "SELECT owner_id FROM workflows WHERE id = ?1",
                    params![workflow_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
                .ok_or_else(not_found)?;
            Ok(owner == caller_id)
        })
    }

    fn list(
        &self,
        scope: WorkflowScope,
        caller_id: &str,
    ) -> BoxFuture<'_, Result<Vec<WorkflowSummary>>> {
        let caller_id = caller_id.to_string();
        Box::pin(async move {
            let filter = match scope {
                WorkflowScope::My => "owner_id = ?1",
                WorkflowScope::Public => "is_public = 1 AND ?1 IS NOT NULL",
            };
            let conn = self.db.lock()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, name, description, is_public, thumbnail_ref, owner_id,
                            owner_email, node_count, edge_count, created_at, updated_at
                     FROM workflows WHERE {}
                     ORDER BY created_at DESC",
                    filter
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![caller_id], |row| {
                    let created: String = row.get(9)?;
                    let updated: String = row.get(10)?;
                    Ok(WorkflowSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        is_public: row.get(3)?,
                        thumbnail_ref: row.get(4)?,
                        owner_id: row.get(5)?,
                        owner_email: row.get(6)?,
                        node_count: row.get::<_, i64>(7)? as usize,
                        edge_count: row.get::<_, i64>(8)? as usize,
                        created_at: parse_ts(&created),
                        updated_at: parse_ts(&updated),
                    })
                })
                .map_err(db_err)?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row.map_err(db_err)?);
            }
            Ok(summaries)
        })
    }

    fn delete(&self, workflow_id: &str) -> BoxFuture<'_, Result<()>> {
        let workflow_id = workflow_id.to_string();
        Box::pin(async move {
            let conn = self.db.lock()?;
            let removed = conn
                .execute("DELETE FROM workflows WHERE id = ?1", params![workflow_id])
                .map_err(db_err)?;
            if removed == 0 {
                return Err(not_found());
            }
            Ok(())
        })
    }
}
