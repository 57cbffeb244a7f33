use crate::error::{Error, Result};
use crate::models::candidate::{Candidate, PipelineStage};
use crate::store::CandidateStore;

/// Moves `candidate` to `to` through a conditional write on its current
/// stage. Illegal moves are rejected; moving to the current stage is a no-op.
pub async fn advance_stage(
    candidates: &dyn CandidateStore,
    candidate: &Candidate,
    to: PipelineStage,
) -> Result<Candidate> {
    let from = candidate.pipeline_stage;
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition(format!(
            "Candidate {} cannot move from {} to {}",
            candidate.id, from, to
        )));
    }
    if from == to {
        return Ok(candidate.clone());
    }

    if let Some(updated) = candidates.update_stage(candidate.id, from, to).await? {
        tracing::info!(candidate_id = %candidate.id, %from, %to, "Pipeline stage advanced");
        return Ok(updated);
    }

    // Lost the race: accept a concurrent writer that reached the same stage.
    let current = candidates
        .get_candidate(candidate.id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("candidate {}", candidate.id)))?;
    if current.pipeline_stage == to {
        return Ok(current);
    }
    Err(Error::InvalidTransition(format!(
        "Candidate {} moved to {} concurrently",
        candidate.id, current.pipeline_stage
    )))
}
