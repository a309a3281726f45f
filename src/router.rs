use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::error::{CandidateError, ExhaustedError, IoTHubError};
use crate::failure::{classify, FailureClass};
use crate::transport::{ConnectionHandle, HandleFactory, TransportCandidate, TransportKind};

/// Opens a connection using the first workable transport from an ordered candidate list.
///
/// Candidates are tried strictly in the order given, one at a time. Only failures
/// classified as [`FailureClass::Retriable`] advance to the next candidate; anything else
/// stops the search. The handle that opened is cached, and later calls to
/// [`open`](TransportRouter::open) return it without touching the network for as long as
/// it stays usable.
///
/// `open` takes `&mut self`, so callers sharing a router across tasks have to serialize
/// access themselves, for example behind a `tokio::sync::Mutex`.
///
/// The router doesn't dispose its handle on drop; call [`close`](TransportRouter::close)
/// when the owning client shuts down.
pub struct TransportRouter<F: HandleFactory> {
    candidates: Vec<TransportCandidate>,
    factory: F,
    cached: Option<F::Handle>,
}

impl<F: HandleFactory> TransportRouter<F> {
    /// Create a router over `candidates`, most preferred first
    pub fn new(candidates: Vec<TransportCandidate>, factory: F) -> crate::Result<Self> {
        if candidates.is_empty() {
            return Err(IoTHubError::NoCandidates);
        }

        Ok(Self {
            candidates,
            factory,
            cached: None,
        })
    }

    /// Candidates in the order they are attempted
    pub fn candidates(&self) -> &[TransportCandidate] {
        &self.candidates
    }

    /// The cached handle, if one has been opened
    pub fn current(&self) -> Option<&F::Handle> {
        self.cached.as_ref()
    }

    /// Transport of the cached handle
    pub fn active_transport(&self) -> Option<TransportKind> {
        self.cached.as_ref().map(|handle| handle.kind())
    }

    /// Return a usable connection, opening a new one if needed.
    ///
    /// Each call that has to connect starts again from the first candidate. Retriable
    /// rejections from every candidate give [`IoTHubError::Exhausted`]; a fatal failure is
    /// returned as is; cancellation gives [`IoTHubError::Cancelled`].
    pub async fn open(&mut self, cancel: &CancellationToken) -> crate::Result<&F::Handle> {
        match self.cached.take() {
            Some(handle) if handle.is_usable() => {
                trace!("Reusing {} connection", handle.kind());
                return Ok(&*self.cached.insert(handle));
            }
            Some(stale) => {
                debug!("Cached {} connection is no longer usable", stale.kind());
                dispose_quietly(stale).await;
            }
            None => {}
        }

        let handle = self.connect(cancel).await?;
        Ok(&*self.cached.insert(handle))
    }

    /// Dispose the cached handle
    pub async fn close(&mut self) {
        if let Some(handle) = self.cached.take() {
            debug!("Closing {} connection", handle.kind());
            dispose_quietly(handle).await;
        }
    }

    async fn connect(&self, cancel: &CancellationToken) -> crate::Result<F::Handle> {
        let mut rejected: Vec<CandidateError> = Vec::new();

        for (index, candidate) in self.candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!("Open cancelled before trying candidate {}", index);
                return Err(IoTHubError::Cancelled);
            }

            debug!("Trying transport candidate {} ({})", index, candidate.kind);
            let mut handle = self.factory.create(candidate);

            let error = match handle.open(cancel).await {
                Ok(()) => {
                    info!("Connected using {} transport", candidate.kind);
                    return Ok(handle);
                }
                Err(error) => error,
            };

            let class = if cancel.is_cancelled() {
                FailureClass::Cancelled
            } else {
                classify(&error)
            };

            dispose_quietly(handle).await;

            match class {
                FailureClass::Retriable => {
                    warn!(
                        "Transport {} rejected, trying next candidate: {}",
                        candidate.kind, error
                    );
                    rejected.push(CandidateError {
                        kind: candidate.kind,
                        error,
                    });
                }
                FailureClass::Fatal => {
                    error!("Failed to connect using {}: {}", candidate.kind, error);
                    return Err(error);
                }
                FailureClass::Cancelled => {
                    debug!("Open cancelled while trying {}", candidate.kind);
                    return Err(IoTHubError::Cancelled);
                }
            }
        }

        match rejected.pop() {
            Some(last) => Err(ExhaustedError::new(rejected, last).into()),
            None => Err(IoTHubError::NoCandidates),
        }
    }
}

impl<F: HandleFactory> fmt::Debug for TransportRouter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRouter")
            .field("candidates", &self.candidates)
            .field("active_transport", &self.active_transport())
            .finish()
    }
}

async fn dispose_quietly<H: ConnectionHandle>(mut handle: H) {
    if let Err(e) = handle.dispose().await {
        warn!("Error disposing {} connection: {}", handle.kind(), e);
    }
}
