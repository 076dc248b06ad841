//! Background sampling loop.
//!
//! A [`SamplingTicker`] owns a [`MetricsProvider`] and, once started, drives it
//! from a dedicated tokio task on a fixed interval. The first successful
//! sample becomes the baseline; every later one is turned into a [`Delta`]
//! against the previous sample and published on the data channel. Failures
//! go to a separate error channel and do not end the stream unless the
//! source is gone for good.
//!
//! ```text
//! Idle --start()--> Running --stop()--> Stopped --close()--> Closed
//!   \_______________stop()______________/
//! ```

use crate::config::{DeliveryPolicy, SamplerConfig};
use crate::error::{Result, SamplerError};
use crate::metrics::{
    builder::SnapshotBuilder,
    clock::ClockRate,
    data::{Delta, Snapshot},
    delta::DeltaCalculator,
    traits::MetricsProvider,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`SamplingTicker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    /// Constructed, not started
    Idle,
    /// Background sampling active
    Running,
    /// Cancellation requested
    Stopped,
    /// Channels released
    Closed,
}

impl TickerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        }
    }
}

enum DeltaSender {
    Wait(mpsc::Sender<Delta>),
    DropNewest(mpsc::Sender<Delta>),
    DropOldest(RingSender),
}

enum DeltaReceiver {
    Queue(mpsc::Receiver<Delta>),
    Ring(RingReceiver),
}

/// The consumer is gone; nothing more can be published.
struct Disconnected;

fn delta_channel(policy: DeliveryPolicy) -> (DeltaSender, DeltaReceiver) {
    let capacity = policy.capacity();
    match policy {
        DeliveryPolicy::Block | DeliveryPolicy::Bounded { .. } => {
            let (tx, rx) = mpsc::channel(capacity);
            (DeltaSender::Wait(tx), DeltaReceiver::Queue(rx))
        }
        DeliveryPolicy::DropNewest { .. } => {
            let (tx, rx) = mpsc::channel(capacity);
            (DeltaSender::DropNewest(tx), DeltaReceiver::Queue(rx))
        }
        DeliveryPolicy::DropOldest { .. } => {
            let (tx, rx) = ring_channel(capacity);
            (DeltaSender::DropOldest(tx), DeltaReceiver::Ring(rx))
        }
    }
}

impl DeltaSender {
    async fn publish(&self, delta: Delta) -> std::result::Result<(), Disconnected> {
        match self {
            Self::Wait(tx) => tx.send(delta).await.map_err(|_| Disconnected),
            Self::DropNewest(tx) => match tx.try_send(delta) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Delta queue full, dropping newest delta");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(Disconnected),
            },
            Self::DropOldest(tx) => tx.push(delta),
        }
    }
}

impl DeltaReceiver {
    async fn recv(&mut self) -> Option<Delta> {
        match self {
            Self::Queue(rx) => rx.recv().await,
            Self::Ring(rx) => rx.recv().await,
        }
    }
}

/// Fixed-size queue that evicts its oldest entry when full.
struct Ring {
    capacity: usize,
    state: Mutex<RingState>,
    notify: Notify,
}

#[derive(Default)]
struct RingState {
    queue: VecDeque<Delta>,
    sender_closed: bool,
    receiver_closed: bool,
}

impl Ring {
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RingSender(Arc<Ring>);

struct RingReceiver(Arc<Ring>);

fn ring_channel(capacity: usize) -> (RingSender, RingReceiver) {
    let ring = Arc::new(Ring {
        capacity,
        state: Mutex::new(RingState {
            queue: VecDeque::with_capacity(capacity),
            ..Default::default()
        }),
        notify: Notify::new(),
    });
    (RingSender(ring.clone()), RingReceiver(ring))
}

impl RingSender {
    fn push(&self, delta: Delta) -> std::result::Result<(), Disconnected> {
        {
            let mut state = self.0.lock();
            if state.receiver_closed {
                return Err(Disconnected);
            }
            if state.queue.len() >= self.0.capacity && state.queue.pop_front().is_some() {
                debug!("Delta ring full, dropping oldest delta");
            }
            state.queue.push_back(delta);
        }
        self.0.notify.notify_one();
        Ok(())
    }
}

impl Drop for RingSender {
    fn drop(&mut self) {
        self.0.lock().sender_closed = true;
        self.0.notify.notify_one();
    }
}

impl RingReceiver {
    async fn recv(&mut self) -> Option<Delta> {
        loop {
            {
                let mut state = self.0.lock();
                if let Some(delta) = state.queue.pop_front() {
                    return Some(delta);
                }
                if state.sender_closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a push between the check and
            // this await is not lost.
            self.0.notify.notified().await;
        }
    }
}

impl Drop for RingReceiver {
    fn drop(&mut self) {
        self.0.lock().receiver_closed = true;
    }
}

/// Everything the worker task takes ownership of on `start()`.
struct Worker<P> {
    provider: P,
    config: SamplerConfig,
    calculator: DeltaCalculator,
    deltas: DeltaSender,
    errors: mpsc::Sender<SamplerError>,
    cancel: watch::Receiver<bool>,
}

/// Periodic sampler streaming [`Delta`]s and errors.
pub struct SamplingTicker<P: MetricsProvider = SnapshotBuilder> {
    config: SamplerConfig,
    clock: ClockRate,
    state: TickerState,
    pending: Option<(P, DeltaSender, mpsc::Sender<SamplerError>)>,
    cancel: watch::Sender<bool>,
    deltas: Option<DeltaReceiver>,
    errors: Option<mpsc::Receiver<SamplerError>>,
    worker: Option<JoinHandle<()>>,
}

impl SamplingTicker<SnapshotBuilder> {
    /// Open `config.source_path` and build an idle ticker over it.
    pub fn from_config(config: SamplerConfig) -> Result<Self> {
        let builder = SnapshotBuilder::open(&config.source_path)?;
        Self::new(builder, config)
    }
}

impl<P: MetricsProvider> SamplingTicker<P> {
    /// Create an idle ticker sampling `provider`.
    pub fn new(provider: P, config: SamplerConfig) -> Result<Self> {
        config.validate()?;

        let (delta_tx, delta_rx) = delta_channel(config.delivery);
        let (error_tx, error_rx) = mpsc::channel(config.error_capacity);
        let (cancel, _) = watch::channel(false);

        Ok(Self {
            config,
            clock: ClockRate::system(),
            state: TickerState::Idle,
            pending: Some((provider, delta_tx, error_tx)),
            cancel,
            deltas: Some(delta_rx),
            errors: Some(error_rx),
            worker: None,
        })
    }

    /// Override the clock rate used for tick-to-seconds conversion.
    pub fn with_clock_rate(mut self, clock: ClockRate) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> TickerState {
        self.state
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Spawn the sampling task. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != TickerState::Idle {
            return Err(self.invalid("start"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SamplerError::system_error(format!("no tokio runtime: {}", e)))?;
        let (provider, deltas, errors) = self
            .pending
            .take()
            .ok_or_else(|| SamplerError::system_error("ticker provider already consumed"))?;

        let worker = Worker {
            provider,
            config: self.config.clone(),
            calculator: DeltaCalculator::new(self.clock),
            deltas,
            errors,
            cancel: self.cancel.subscribe(),
        };
        self.worker = Some(runtime.spawn(worker.run()));
        self.state = TickerState::Running;

        info!(
            "Sampling {} every {}ms ({:?})",
            self.config.source_path.display(),
            self.config.interval_ms,
            self.config.delivery
        );
        Ok(())
    }

    /// Request cancellation. A tick already in progress runs to completion.
    pub fn stop(&mut self) {
        if matches!(self.state, TickerState::Idle | TickerState::Running) {
            self.cancel.send_replace(true);
            self.pending = None;
            self.state = TickerState::Stopped;
            debug!("Sampling stop requested");
        }
    }

    /// Release both channels and wait for the sampling task to exit.
    ///
    /// Only valid after [`stop`](Self::stop). Once this returns, reads from
    /// either channel yield `None`.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            TickerState::Stopped => {}
            TickerState::Closed => return Ok(()),
            TickerState::Idle | TickerState::Running => return Err(self.invalid("close")),
        }

        // Dropping the receivers first unblocks a worker stuck in a send.
        self.deltas = None;
        self.errors = None;
        self.state = TickerState::Closed;

        if let Some(worker) = self.worker.take() {
            worker.await.map_err(|e| {
                SamplerError::system_error(format!("sampling task failed: {}", e))
            })?;
        }
        info!("Sampling closed");
        Ok(())
    }

    /// Wait for the next Delta. `None` once the stream has ended.
    pub async fn next_delta(&mut self) -> Option<Delta> {
        match self.deltas.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// The Delta channel as a stream.
    pub fn deltas(&mut self) -> BoxStream<'_, Delta> {
        stream::unfold(self, |ticker| async move {
            let delta = ticker.next_delta().await?;
            Some((delta, ticker))
        })
        .boxed()
    }

    /// Wait for the next sampling error. `None` once the stream has ended
    /// or the receiver was taken.
    pub async fn next_error(&mut self) -> Option<SamplerError> {
        match self.errors.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Pop an already-published error without waiting.
    pub fn try_next_error(&mut self) -> Option<SamplerError> {
        self.errors.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Hand the error channel to the caller, e.g. to drain it from another task.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<SamplerError>> {
        self.errors.take()
    }

    fn invalid(&self, operation: &'static str) -> SamplerError {
        SamplerError::InvalidState {
            operation,
            state: self.state.as_str(),
        }
    }
}

impl<P: MetricsProvider> Drop for SamplingTicker<P> {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

impl<P: MetricsProvider> Worker<P> {
    async fn run(mut self) {
        let mut interval = time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut baseline = Snapshot::default();
        let mut current = Snapshot::default();
        let mut has_baseline = false;
        let mut ticks: u64 = 0;

        loop {
            let cancelled = *self.cancel.borrow();
            if cancelled {
                break;
            }
            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                debug!("Reached {} ticks", ticks);
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                // Also fires when the ticker handle is dropped.
                _ = self.cancel.changed() => break,
            }
            ticks += 1;

            if let Err(err) = self.provider.collect_into(&mut current) {
                if !self.recover(err) {
                    break;
                }
                continue;
            }

            if !has_baseline {
                std::mem::swap(&mut baseline, &mut current);
                has_baseline = true;
                debug!("Baseline established with {} units", baseline.units.len());
                continue;
            }

            let delta = self.calculator.compute(&baseline, &current);
            std::mem::swap(&mut baseline, &mut current);
            match delta {
                Ok(delta) => {
                    if self.deltas.publish(delta).await.is_err() {
                        debug!("Delta receiver dropped");
                        break;
                    }
                }
                Err(err) => {
                    warn!("Re-baselining after delta failure: {}", err);
                    self.report(err);
                }
            }
        }

        debug!("Sampling task exiting after {} ticks", ticks);
    }

    /// Publish a sampling failure and decide whether sampling can go on.
    fn recover(&mut self, err: SamplerError) -> bool {
        if err.is_terminal() {
            error!("Source unusable: {}", err);
            self.report(err);
            return false;
        }

        let needs_reopen = err.is_io();
        warn!("Sample failed: {}", err);
        self.report(err);

        if needs_reopen {
            if let Err(reopen_err) = self.provider.reopen() {
                error!("Could not reopen source: {}", reopen_err);
                self.report(reopen_err);
                return false;
            }
        }
        true
    }

    fn report(&self, err: SamplerError) {
        match self.errors.try_send(err) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(err)) => {
                warn!("Error queue full, dropping: {}", err);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
