use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::graph::{WorkflowDocument, WorkflowScope, WorkflowSummary};
use genmedia_core::traits::WorkflowRepository;

/// In-memory workflow repository.
#[derive(Default)]
pub struct MemoryWorkflowRepository {
    docs: Mutex<HashMap<String, WorkflowDocument>>,
    saves: AtomicU32,
}

impl MemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly.
    pub fn insert(&self, doc: WorkflowDocument) {
        self.docs.lock().unwrap().insert(doc.id.clone(), doc);
    }

    /// The stored copy, bypassing the trait.
    pub fn stored(&self, id: &str) -> Option<WorkflowDocument> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    pub fn save_calls(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl WorkflowRepository for MemoryWorkflowRepository {
    fn load(&self, workflow_id: &str) -> BoxFuture<'_, Result<WorkflowDocument>> {
        let outcome = self
            .docs
            .lock()
            .unwrap()
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| GenmediaError::NotFound("Workflow not found".into()));
        Box::pin(async move { outcome })
    }

    fn save(&self, workflow: &WorkflowDocument) -> BoxFuture<'_, Result<()>> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.docs
            .lock()
            .unwrap()
            .insert(workflow.id.clone(), workflow.clone());
        Box::pin(async { Ok(()) })
    }

    fn check_ownership(&self, workflow_id: &str, caller_id: &str) -> BoxFuture<'_, Result<bool>> {
        let outcome = match self.docs.lock().unwrap().get(workflow_id) {
            Some(doc) => Ok(doc.owner_id == caller_id),
            None => Err(GenmediaError::NotFound("Workflow not found".into())),
        };
        Box::pin(async move { outcome })
    }

    fn list(
        &self,
        scope: WorkflowScope,
        caller_id: &str,
    ) -> BoxFuture<'_, Result<Vec<WorkflowSummary>>> {
        let mut docs: Vec<WorkflowDocument> = self
            .docs
            .lock()
            .unwrap()
            .values()
            .filter(|d| match scope {
                WorkflowScope::My => d.owner_id == caller_id,
                WorkflowScope::Public => d.is_public,
            })
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let summaries = docs.iter().map(WorkflowDocument::summary).collect();
        Box::pin(async move { Ok(summaries) })
    }

    fn delete(&self, workflow_id: &str) -> BoxFuture<'_, Result<()>> {
        let outcome = match self.docs.lock().unwrap().remove(workflow_id) {
            Some(_) => Ok(()),
            None => Err(GenmediaError::NotFound("Workflow not found".into())),
        };
        Box::pin(async move { outcome })
    }
}
