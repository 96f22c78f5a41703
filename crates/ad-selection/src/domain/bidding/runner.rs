use {
    super::{BidGenerator, BuyerContext, Error, Stats},
    crate::{
        domain::{
            audience::{AdTechIdentifier, BuyerGroup},
            bid::BidOutcome,
        },
        infra::{Executors, observe},
    },
    futures::future::join_all,
    std::{sync::Arc, time::Duration},
    tokio::{task::JoinHandle, time::Instant},
    tracing::Instrument,
};

/// Runs the bidding of all groups of one buyer concurrently.
pub struct BuyerBiddingRunner {
    generator: Arc<BidGenerator>,
    executors: Executors,
    timeout: Duration,
}

impl BuyerBiddingRunner {
    pub fn new(generator: Arc<BidGenerator>, executors: Executors, timeout: Duration) -> Self {
        Self {
            generator,
            executors,
            timeout,
        }
    }

    /// Returns one result per group, in the order of `groups`. Trusted
    /// signals are fetched once for all groups, then each group is a separate
    /// task so a slow or failing group never holds up its siblings. Groups
    /// still running when the buyer's deadline expires, or when the returned
    /// future is dropped, are cancelled and reported as timed out.
    pub async fn run(
        &self,
        buyer: &AdTechIdentifier,
        groups: Vec<BuyerGroup>,
        mut context: BuyerContext,
    ) -> Vec<Result<Option<BidOutcome>, Error>> {
        let deadline = Instant::now() + self.timeout;
        let fetched = tokio::time::timeout_at(deadline, self.generator.fetch_signals(&groups))
            .await
            .unwrap_or_default();
        context.trusted_signals = Some(Arc::new(fetched));

        let context = Arc::new(context);
        let tasks: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let stats = Stats::new(group.buyer.clone(), group.ads.len());
                let generator = self.generator.clone();
                let context = context.clone();
                let span =
                    tracing::info_span!("bidding", buyer = %group.buyer, group = %group.name);
                let handle = self.executors.background.spawn(
                    async move { generator.generate(&group, &context).await }.instrument(span),
                );
                GroupTask {
                    handle,
                    generator: self.generator.clone(),
                    pending: Some(stats),
                    start: Instant::now(),
                }
            })
            .collect();

        join_all(tasks.into_iter().map(|mut task| async move {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(result) => {
                    task.pending = None;
                    result.unwrap_or_else(|err| Err(Error::Task(err)))
                }
                Err(_) => {
                    task.cancel();
                    observe::bidding_cancelled(buyer);
                    Err(Error::TimedOut)
                }
            }
        }))
        .await
    }
}

/// A spawned group bidding. Dropping it before the task finished cancels the
/// task.
struct GroupTask {
    handle: JoinHandle<Result<Option<BidOutcome>, Error>>,
    generator: Arc<BidGenerator>,
    /// Stats to record if the task never gets to record its own.
    pending: Option<Stats>,
    start: Instant,
}

impl GroupTask {
    fn cancel(&mut self) {
        self.handle.abort();
        if let Some(stats) = self.pending.take() {
            self.generator.cancelled(stats, self.start.elapsed());
        }
    }
}

impl Drop for GroupTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.cancel();
        }
    }
}
