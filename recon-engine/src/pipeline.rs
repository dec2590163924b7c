//! Processor pipeline
//!
//! Pairs flow from the differ through an ordered chain of processors
//! connected by bounded channels. A processor either transforms a pair and
//! passes it on, or resolves it; resolved pairs leave the pair stream and
//! travel down the resolution stream instead, visible to the remaining
//! processors through `handle_resolution`. Stages drain their inputs to
//! end-of-stream and exit, so dropping the upstream sender is the
//! cancellation signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use recon_core::{DeployablePair, DiffResolution};

/// Channel depth between pipeline stages.
const STAGE_BUFFER: usize = 16;

/// What a processor did with a pair.
pub enum PairOutcome {
    /// Pass the (possibly transformed) pair downstream
    Proceed(DeployablePair),
    /// Resolve the pair here; downstream processors will not see it
    Resolved(DiffResolution),
}

/// One stage of the resolution pipeline.
#[async_trait]
pub trait PairProcessor: Send + Sync + 'static {
    /// Handle one pair
    async fn handle_pair(&self, pair: DeployablePair) -> PairOutcome;

    /// Observe a resolution produced upstream
    async fn handle_resolution(&self, _resolution: &DiffResolution) {}
}

/// The pair and resolution streams between two pipeline stages.
pub struct DeployableChans {
    /// Pairs still in flight
    pub pairs: mpsc::Receiver<DeployablePair>,
    /// Resolutions produced so far
    pub resolutions: mpsc::Receiver<DiffResolution>,
}

impl DeployableChans {
    /// Seed a pipeline with the differ's output.
    pub fn seed(pairs: Vec<DeployablePair>) -> Self {
        let (pair_tx, pair_rx) = mpsc::channel(pairs.len().max(1));
        let (_res_tx, res_rx) = mpsc::channel(1);
        for pair in pairs {
            // Capacity covers every seeded pair, so this cannot fail.
            pair_tx
                .try_send(pair)
                .expect("seed channel sized to input");
        }
        Self {
            pairs: pair_rx,
            resolutions: res_rx,
        }
    }

    /// Chain a processor onto this stream, returning its output stream.
    pub fn pipeline(mut self, processor: Arc<dyn PairProcessor>) -> DeployableChans {
        let (pair_tx, pair_rx) = mpsc::channel(STAGE_BUFFER);
        let (res_tx, res_rx) = mpsc::channel(STAGE_BUFFER);

        tokio::spawn(async move {
            let mut pairs_open = true;
            let mut resolutions_open = true;
            while pairs_open || resolutions_open {
                tokio::select! {
                    pair = self.pairs.recv(), if pairs_open => match pair {
                        Some(pair) => match processor.handle_pair(pair).await {
                            PairOutcome::Proceed(pair) => {
                                if pair_tx.send(pair).await.is_err() {
                                    return;
                                }
                            }
                            PairOutcome::Resolved(resolution) => {
                                if res_tx.send(resolution).await.is_err() {
                                    return;
                                }
                            }
                        },
                        None => pairs_open = false,
                    },
                    resolution = self.resolutions.recv(), if resolutions_open => match resolution {
                        Some(resolution) => {
                            processor.handle_resolution(&resolution).await;
                            if res_tx.send(resolution).await.is_err() {
                                return;
                            }
                        }
                        None => resolutions_open = false,
                    },
                }
            }
        });

        DeployableChans {
            pairs: pair_rx,
            resolutions: res_rx,
        }
    }
}

/// Pipeline stage that logs every pair and resolution passing through.
pub struct LoggingProcessor;

#[async_trait]
impl PairProcessor for LoggingProcessor {
    async fn handle_pair(&self, pair: DeployablePair) -> PairOutcome {
        tracing::debug!(
            deployment_id = %pair.id,
            pair_kind = %pair.kind(),
            "pair entering executor handoff"
        );
        PairOutcome::Proceed(pair)
    }

    async fn handle_resolution(&self, resolution: &DiffResolution) {
        match &resolution.error {
            Some(err) => tracing::info!(
                deployment_id = %resolution.id,
                resolution = %resolution.desc,
                error = %err,
                "pair resolved with error"
            ),
            None => tracing::debug!(
                deployment_id = %resolution.id,
                resolution = %resolution.desc,
                "pair resolved"
            ),
        }
    }
}
