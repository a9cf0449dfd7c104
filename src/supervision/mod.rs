//! Supervision/Promotion Bridge.
//!
//! Drives `WorkOutput.supervision_status` through its review lifecycle and,
//! on approval, optionally promotes the output into a durable substrate
//! block. This component never persists anything locally: every read and
//! write passes through the substrate client, since WorkOutput rows are
//! substrate-owned.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::Database;
use crate::error::AppError;
use crate::model::{PromotionMethod, SupervisionStatus, WorkOutput};
use crate::substrate::types::{
    CreateProposalRequest, ListWorkOutputsFilter, MarkOutputPromotedRequest, ProposalOp,
    SkipPromotionRequest, UpdateWorkOutputRequest,
};
use crate::substrate::{AuthOverride, SubstrateClient};

/// Result of an `approve` call: the updated output, plus whether this call
/// also synchronously promoted it (when `promotion_mode` is auto, the
/// bridge calls `promote` itself).
#[derive(Debug, Clone)]
pub struct ApproveOutcome {
    pub output: WorkOutput,
    pub auto_promoted: bool,
}

pub struct SupervisionBridge {
    substrate: Arc<SubstrateClient>,
    db: Arc<dyn Database>,
}

impl SupervisionBridge {
    pub fn new(substrate: Arc<SubstrateClient>, db: Arc<dyn Database>) -> Self {
        Self { substrate, db }
    }

    pub async fn list_outputs(
        &self,
        auth: &AuthOverride,
        basket_id: Uuid,
        filter: &ListWorkOutputsFilter,
    ) -> Result<Vec<WorkOutput>, AppError> {
        Ok(self.substrate.list_work_outputs(auth, basket_id, filter).await?)
    }

    /// `pending_review|revision_requested -- approve --> approved`. When the
    /// owning project's promotion_mode is auto and the output's type is in
    /// its auto_promote_types, attempts promotion before returning; a
    /// promotion failure here is swallowed (the output stays `approved`
    /// with no promotion_method, safely retriable via an explicit
    /// `promote` call later).
    pub async fn approve(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        user_id: &str,
        reviewer_notes: Option<String>,
    ) -> Result<ApproveOutcome, AppError> {
        let output = self.substrate.get_work_output(auth, output_id).await?;
        require_source_status(
            output.supervision_status,
            &[SupervisionStatus::PendingReview, SupervisionStatus::RevisionRequested],
        )?;

        self.substrate
            .update_work_output(
                auth,
                output_id,
                UpdateWorkOutputRequest {
                    supervision_status: SupervisionStatus::Approved.as_str().to_string(),
                    reviewer_notes,
                },
            )
            .await?;

        let mut output = self.substrate.get_work_output(auth, output_id).await?;

        let mut auto_promoted = false;
        if output.output_type.is_promotable() {
            if let Some(project) = self.db.get_project_by_basket(output.basket_id).await? {
                let should_auto_promote = project.promotion_mode == crate::model::PromotionMode::Auto
                    && project
                        .auto_promote_types
                        .iter()
                        .any(|t| t == output.output_type.as_str());

                if should_auto_promote {
                    match self.promote(auth, output_id, user_id, PromotionMethod::Auto).await {
                        Ok(promoted) => {
                            output = promoted;
                            auto_promoted = true;
                        }
                        Err(err) => {
                            tracing::warn!(
                                output_id = %output_id,
                                error = %err,
                                "auto-promotion failed, output stays approved unpromoted"
                            );
                        }
                    }
                }
            }
        }

        Ok(ApproveOutcome { output, auto_promoted })
    }

    /// `pending_review|revision_requested -- reject --> rejected`.
    pub async fn reject(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        reviewer_notes: Option<String>,
    ) -> Result<WorkOutput, AppError> {
        let output = self.substrate.get_work_output(auth, output_id).await?;
        require_source_status(
            output.supervision_status,
            &[SupervisionStatus::PendingReview, SupervisionStatus::RevisionRequested],
        )?;

        self.substrate
            .update_work_output(
                auth,
                output_id,
                UpdateWorkOutputRequest {
                    supervision_status: SupervisionStatus::Rejected.as_str().to_string(),
                    reviewer_notes,
                },
            )
            .await?;

        Ok(self.substrate.get_work_output(auth, output_id).await?)
    }

    /// `pending_review -- revise --> revision_requested`.
    pub async fn request_revision(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        reviewer_notes: Option<String>,
    ) -> Result<WorkOutput, AppError> {
        let output = self.substrate.get_work_output(auth, output_id).await?;
        require_source_status(output.supervision_status, &[SupervisionStatus::PendingReview])?;

        self.substrate
            .update_work_output(
                auth,
                output_id,
                UpdateWorkOutputRequest {
                    supervision_status: SupervisionStatus::RevisionRequested.as_str().to_string(),
                    reviewer_notes,
                },
            )
            .await?;

        Ok(self.substrate.get_work_output(auth, output_id).await?)
    }

    /// `approved -- promote(method) --> (proposal created, method set)`.
    /// Enforces the promotion-uniqueness invariant: an output with a
    /// non-null `substrate_proposal_id` fails with Conflict.
    pub async fn promote(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        user_id: &str,
        method: PromotionMethod,
    ) -> Result<WorkOutput, AppError> {
        let output = self.substrate.get_work_output(auth, output_id).await?;

        if output.supervision_status != SupervisionStatus::Approved {
            return Err(AppError::Conflict(format!(
                "output {output_id} must be approved before promotion (is {})",
                output.supervision_status.as_str()
            )));
        }
        if output.substrate_proposal_id.is_some() {
            return Err(AppError::Conflict(format!("output {output_id} is already promoted")));
        }
        if !output.output_type.is_promotable() {
            return Err(AppError::Validation(format!(
                "output_type {} is not promotable",
                output.output_type.as_str()
            )));
        }

        let content = serde_json::to_string(&output.body).unwrap_or_default();
        let op = ProposalOp {
            op_type: "create_block".to_string(),
            semantic_type: output.output_type.semantic_type().to_string(),
            title: output.title.clone(),
            content,
            confidence: output.confidence,
            source_context_ids: output.source_context_ids.clone(),
            metadata: serde_json::json!({"source_work_output_id": output_id}),
        };

        let proposal = self
            .substrate
            .create_proposal(
                auth,
                CreateProposalRequest {
                    basket_id: output.basket_id,
                    ops: vec![op],
                },
            )
            .await?;

        self.substrate
            .mark_output_promoted(
                auth,
                output_id,
                MarkOutputPromotedRequest {
                    proposal_id: proposal.proposal_id,
                    method: method.as_str().to_string(),
                    user_id: user_id.to_string(),
                },
            )
            .await?;

        Ok(self.substrate.get_work_output(auth, output_id).await?)
    }

    /// `approved -- skip_promotion --> method=skipped`.
    pub async fn skip_promotion(
        &self,
        auth: &AuthOverride,
        output_id: Uuid,
        user_id: &str,
        reason: Option<String>,
    ) -> Result<WorkOutput, AppError> {
        let output = self.substrate.get_work_output(auth, output_id).await?;

        if output.supervision_status != SupervisionStatus::Approved {
            return Err(AppError::Conflict(format!(
                "output {output_id} must be approved before skip_promotion (is {})",
                output.supervision_status.as_str()
            )));
        }
        if output.substrate_proposal_id.is_some() {
            return Err(AppError::Conflict(format!("output {output_id} is already promoted")));
        }

        self.substrate
            .skip_output_promotion(
                auth,
                output_id,
                SkipPromotionRequest {
                    user_id: user_id.to_string(),
                    reason,
                },
            )
            .await?;

        Ok(self.substrate.get_work_output(auth, output_id).await?)
    }
}

fn require_source_status(
    actual: SupervisionStatus,
    allowed: &[SupervisionStatus],
) -> Result<(), AppError> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "cannot transition from supervision_status {}",
            actual.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_source_status_accepts_allowed() {
        assert!(
            require_source_status(
                SupervisionStatus::PendingReview,
                &[SupervisionStatus::PendingReview, SupervisionStatus::RevisionRequested],
            )
            .is_ok()
        );
    }

    #[test]
    fn require_source_status_rejects_disallowed() {
        let err = require_source_status(SupervisionStatus::Rejected, &[SupervisionStatus::Approved])
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
