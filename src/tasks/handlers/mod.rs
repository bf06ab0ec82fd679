mod deliver;
mod evaluate;
mod ingest_telegram;
mod normalize;

use anyhow::Result;

use crate::domain::lifecycle::Stage;
use crate::repositories::claims::WorkClaim;
use crate::tasks::worker::{ProcessResult, WorkerDeps};

/// Static stage dispatch; the four handlers differ only in business logic,
/// never in their contract with the loop.
pub(crate) async fn process(
    stage: Stage,
    claim: &WorkClaim,
    deps: &WorkerDeps,
) -> Result<ProcessResult> {
    match stage {
        Stage::TelegramIngest => ingest_telegram::process_claim(claim, deps).await,
        Stage::Normalize => normalize::process_claim(claim, deps).await,
        Stage::Evaluate => evaluate::process_claim(claim, deps).await,
        Stage::Deliver => deliver::process_claim(claim, deps).await,
    }
}
