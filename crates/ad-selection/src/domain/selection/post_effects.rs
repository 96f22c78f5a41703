use {
    super::result::AuctionResult,
    crate::{
        domain::{bid::ScoredOutcome, debug_report},
        infra::{
            observe,
            sinks::{
                AdCounterHistogramUpdater,
                DebugReportSink,
                JoinMessage,
                JoinSignaler,
                NoOpSink,
            },
        },
    },
    std::{future::Future, sync::Arc},
    tokio::runtime::Handle,
    tracing::Instrument,
};

/// Where the side effects of a won auction go.
#[derive(Clone)]
pub struct Sinks {
    pub debug_reports: Arc<dyn DebugReportSink>,
    pub counters: Arc<dyn AdCounterHistogramUpdater>,
    pub join: Arc<dyn JoinSignaler>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self {
            debug_reports: Arc::new(NoOpSink),
            counters: Arc::new(NoOpSink),
            join: Arc::new(NoOpSink),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Effect {
    DebugReports,
    FrequencyCap,
    JoinSignal,
}

/// Fires the side effects of a won auction. Every effect is its own task:
/// they neither wait for nor fail each other, and nothing they do reaches
/// the caller of the auction.
pub struct PostEffects {
    sinks: Sinks,
    handle: Handle,
}

impl PostEffects {
    pub fn new(sinks: Sinks, handle: Handle) -> Self {
        Self { sinks, handle }
    }

    pub fn spawn(&self, result: &AuctionResult, scored: &[ScoredOutcome], winner: usize) {
        let uris = debug_report::resolve(scored, winner);
        if !uris.is_empty() {
            let sink = self.sinks.debug_reports.clone();
            self.detach(Effect::DebugReports, async move { sink.enqueue(uris).await });
        }

        let counters = self.sinks.counters.clone();
        let won = result.clone();
        self.detach(Effect::FrequencyCap, async move {
            counters.record_win(&won).await
        });

        let join = self.sinks.join.clone();
        let message = JoinMessage::new(result);
        self.detach(Effect::JoinSignal, async move { join.submit(message).await });
    }

    fn detach(
        &self,
        effect: Effect,
        task: impl Future<Output = anyhow::Result<()>> + Send + 'static,
    ) {
        self.handle.spawn(
            async move {
                if let Err(err) = task.await {
                    observe::post_effect_failed(effect, &err);
                }
            }
            .in_current_span(),
        );
    }
}
