use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::graph::{
    WorkflowDocument, WorkflowDraft, WorkflowGraph, WorkflowScope, WorkflowSummary,
};
use genmedia_core::traits::WorkflowRepository;
use genmedia_core::types::Caller;

use crate::resolver::GraphResolver;

/// Workflow CRUD with access control. Reads of a single workflow come back
/// resolved; listings carry metadata only.
pub struct WorkflowService {
    repo: Arc<dyn WorkflowRepository>,
    resolver: GraphResolver,
}

impl WorkflowService {
    pub fn new(repo: Arc<dyn WorkflowRepository>, resolver: GraphResolver) -> Self {
        Self { repo, resolver }
    }

    pub fn resolver(&self) -> &GraphResolver {
        &self.resolver
    }

    pub async fn create(&self, draft: WorkflowDraft, caller: &Caller) -> Result<String> {
        validate_draft(&draft)?;

        let now = Utc::now();
        let doc = WorkflowDocument {
            id: generate_workflow_id(),
            name: draft.name.trim().to_string(),
            description: draft.description.trim().to_string(),
            is_public: draft.is_public,
            thumbnail_ref: None,
            created_at: now,
            updated_at: now,
            owner_id: caller.user_id.clone(),
            owner_email: caller.email.clone(),
            graph: draft.graph,
        };
        self.repo.save(&doc).await?;

        info!(workflow_id = %doc.id, user_id = %caller.user_id, "Created workflow");
        Ok(doc.id)
    }

    pub async fn list(
        &self,
        scope: WorkflowScope,
        caller: &Caller,
    ) -> Result<Vec<WorkflowSummary>> {
        self.repo.list(scope, &caller.user_id).await
    }

    /// Fetch a workflow the caller owns or that is public, with references
    /// resolved.
    pub async fn get(&self, workflow_id: &str, caller: &Caller) -> Result<WorkflowDocument> {
        let mut doc = self.repo.load(workflow_id).await?;
        if doc.owner_id != caller.user_id && !doc.is_public {
            return Err(GenmediaError::PermissionDenied("Access denied".into()));
        }
        doc.graph = self.resolver.resolve(&doc.graph).await?;
        Ok(doc)
    }

    pub async fn update(
        &self,
        workflow_id: &str,
        draft: WorkflowDraft,
        caller: &Caller,
    ) -> Result<WorkflowDocument> {
        let mut doc = self.repo.load(workflow_id).await?;
        if !self.repo.check_ownership(workflow_id, &caller.user_id).await? {
            return Err(GenmediaError::PermissionDenied(
                "You can only update your own workflows".into(),
            ));
        }
        validate_draft(&draft)?;

        doc.name = draft.name.trim().to_string();
        doc.description = draft.description.trim().to_string();
        doc.is_public = draft.is_public;
        doc.graph = draft.graph;
        doc.updated_at = Utc::now();
        self.repo.save(&doc).await?;

        info!(workflow_id, user_id = %caller.user_id, "Updated workflow");
        Ok(doc)
    }

    /// Delete a workflow. Artifacts it references are left in place.
    pub async fn delete(&self, workflow_id: &str, caller: &Caller) -> Result<()> {
        if !self.repo.check_ownership(workflow_id, &caller.user_id).await? {
            return Err(GenmediaError::PermissionDenied(
                "You can only delete your own workflows".into(),
            ));
        }
        self.repo.delete(workflow_id).await?;
        info!(workflow_id, user_id = %caller.user_id, "Deleted workflow");
        Ok(())
    }

    /// Copy a workflow the caller owns or that is public. The copy is private
    /// and shares the original's artifact references.
    pub async fn clone_workflow(&self, workflow_id: &str, caller: &Caller) -> Result<String> {
        let original = self.repo.load(workflow_id).await?;
        if !original.is_public && original.owner_id != caller.user_id {
            return Err(GenmediaError::PermissionDenied("Access denied".into()));
        }

        let now = Utc::now();
        let copy = WorkflowDocument {
            id: generate_workflow_id(),
            name: format!("{} (Copy)", original.name),
            description: original.description,
            is_public: false,
            thumbnail_ref: None,
            created_at: now,
            updated_at: now,
            owner_id: caller.user_id.clone(),
            owner_email: caller.email.clone(),
            graph: original.graph,
        };
        self.repo.save(&copy).await?;

        info!(workflow_id, clone_id = %copy.id, user_id = %caller.user_id, "Cloned workflow");
        Ok(copy.id)
    }

    /// Resolve a caller-supplied graph that is not stored anywhere.
    pub async fn resolve_graph(&self, graph: &WorkflowGraph) -> Result<WorkflowGraph> {
        self.resolver.resolve(graph).await
    }
}

fn validate_draft(draft: &WorkflowDraft) -> Result<()> {
    draft.validate()?;
    draft.graph.validate()
}

/// `wf_{unix seconds}_{8 random alphanumerics}`.
fn generate_workflow_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("wf_{}_{}", Utc::now().timestamp(), suffix)
}
