use std::sync::Arc;

use stream_mapper_core::{CanonicalEvent, DiagnosticReport, MappingConfig};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::errors::HarnessError;
use crate::sink::EventSink;
use crate::source::{ByteStream, EventPump};

/// Options for a spawned [`StreamRun`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Capacity of the bounded channel between the pump task and the consumer.
    pub stream_buffer_capacity: usize,
    /// Keep every frame with its outcome for the final report.
    pub record_frames: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stream_buffer_capacity: 64,
            record_frames: true,
        }
    }
}

impl RunOptions {
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub fn record_frames(mut self, record: bool) -> Self {
        self.record_frames = record;
        self
    }
}

/// Handle used to request cancellation of a running stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Reading stops at the next await point; [`StreamRun::finish`] then
    /// returns [`HarnessError::Cancelled`].
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// One response body being normalized on a background task.
///
/// Events arrive through a bounded channel in frame order. `finish()` drains
/// whatever is left and returns the diagnostic report for the stream.
pub struct StreamRun {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<CanonicalEvent>,
    final_rx: oneshot::Receiver<Result<DiagnosticReport, HarnessError>>,
    abort_handle: AbortHandle,
}

impl StreamRun {
    /// Spawns the pump task on the current Tokio runtime.
    pub fn start(
        config: Arc<MappingConfig>,
        bytes: ByteStream,
        options: RunOptions,
    ) -> Result<Self, HarnessError> {
        if options.stream_buffer_capacity == 0 {
            return Err(HarnessError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HarnessError::Config(format!("no tokio runtime available: {e}")))?;

        let pump = if options.record_frames {
            EventPump::recording(config, bytes)
        } else {
            EventPump::new(config, bytes)
        };
        let (tx, rx) = mpsc::channel(options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let run_id = uuid::Uuid::new_v4();

        runtime.spawn(run_task(run_id, pump, tx, final_tx, abort_rx));

        Ok(Self {
            run_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
        })
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next canonical event; `None` once the run has ended.
    pub async fn next_event(&mut self) -> Option<CanonicalEvent> {
        self.rx.recv().await
    }

    /// Drains remaining events and returns the terminal result.
    pub async fn finish(mut self) -> Result<DiagnosticReport, HarnessError> {
        while self.rx.recv().await.is_some() {}
        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::protocol_msg(format!(
                "run task ended without final result (run_id={})",
                self.run_id
            ))),
        }
    }
}

async fn run_task(
    run_id: uuid::Uuid,
    mut pump: EventPump,
    mut sink: mpsc::Sender<CanonicalEvent>,
    final_tx: oneshot::Sender<Result<DiagnosticReport, HarnessError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    debug!(event = "run.started", domain = "run", run_id = %run_id);
    let mut watching_abort = true;
    let outcome = loop {
        tokio::select! {
            changed = abort_rx.changed(), if watching_abort => {
                match changed {
                    Ok(()) if *abort_rx.borrow() => {
                        info!(event = "run.cancelled", domain = "run", run_id = %run_id);
                        break Err(HarnessError::Cancelled);
                    }
                    Ok(()) => {}
                    Err(_) => watching_abort = false,
                }
            }
            next = pump.next_event() => {
                match next {
                    Some(Ok(event)) => {
                        if let Err(err) = EventSink::send(&mut sink, event).await {
                            warn!(event = "run.sink_closed", domain = "run", run_id = %run_id);
                            break Err(err);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(event = "run.failed", domain = "run", run_id = %run_id, error = %err);
                        break Err(err);
                    }
                    None => break Ok(()),
                }
            }
        }
    };
    let result = outcome.map(|()| {
        let report = pump.into_report();
        info!(
            event = "run.completed",
            domain = "run",
            run_id = %run_id,
            state = ?report.state,
            total_frames = report.stats.total_frames,
            events_emitted = report.events_emitted
        );
        report
    });
    let _ = final_tx.send(result);
}
