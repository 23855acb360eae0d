use stream_mapper_core::CanonicalEvent;
use tokio::sync::mpsc;

use crate::errors::HarnessError;
use crate::source::EventPump;

/// Downstream consumer of canonical events (usually the UI stream writer).
#[async_trait::async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: CanonicalEvent) -> Result<(), HarnessError>;
}

#[async_trait::async_trait]
impl EventSink for mpsc::Sender<CanonicalEvent> {
    async fn send(&mut self, event: CanonicalEvent) -> Result<(), HarnessError> {
        mpsc::Sender::send(self, event)
            .await
            .map_err(|_| HarnessError::protocol_msg("event sink receiver dropped"))
    }
}

#[async_trait::async_trait]
impl EventSink for Vec<CanonicalEvent> {
    async fn send(&mut self, event: CanonicalEvent) -> Result<(), HarnessError> {
        self.push(event);
        Ok(())
    }
}

/// Forwards every event from `pump` into `sink`, returning how many were sent.
///
/// Stops at the first body read failure or sink failure.
pub async fn pump_into<S>(pump: &mut EventPump, sink: &mut S) -> Result<usize, HarnessError>
where
    S: EventSink + ?Sized,
{
    let mut forwarded = 0;
    while let Some(event) = pump.next_event().await {
        sink.send(event?).await?;
        forwarded += 1;
    }
    Ok(forwarded)
}
