//! Executes reducer effects once their state change is committed.
//!
//! Effects run inline so the caller knows they have finished before it
//! answers; a slow notifier delays the response rather than racing it.

use futures::future::{BoxFuture, join_all};
use tutorhub_core::effect::Effect;

/// Run one effect tree and collect the actions it feeds back.
pub fn run_effect<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    Box::pin(async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Future(future) => future.await.into_iter().collect(),
            Effect::Delay { duration, action } => {
                tokio::time::sleep(duration).await;
                vec![*action]
            },
            Effect::Parallel(effects) => join_all(effects.into_iter().map(run_effect))
                .await
                .into_iter()
                .flatten()
                .collect(),
            Effect::Sequential(effects) => {
                let mut feedback = Vec::new();
                for effect in effects {
                    feedback.extend(run_effect(effect).await);
                }
                feedback
            },
        }
    })
}

/// Run the effects of one reducer call concurrently.
pub async fn run_effects<A, I>(effects: I) -> Vec<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    let effects: Vec<_> = effects.into_iter().collect();
    if effects.is_empty() {
        return Vec::new();
    }
    tracing::trace!(count = effects.len(), "Executing effects");
    run_effect(Effect::Parallel(effects)).await
}
