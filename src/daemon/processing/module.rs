use anyhow::Result;

use super::TrackerEvent;

/// Consumer of the events arriving at the [ProcessingModule](super::ProcessingModule). It is the
/// only owner of whatever state the events act on.
pub trait EventProcessor {
    fn process_next(
        &mut self,
        event: TrackerEvent,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
