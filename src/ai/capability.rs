use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::error::{AppError, Result};

use super::backend::{Availability, LanguageModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityState {
    Uninitialized,
    Probing,
    Ready,
    Unavailable,
}

/// Lazily probed model session.
///
/// The first caller of [`Capability::session`] runs the probe (and a model
/// download if one is needed). Callers arriving while the probe is in flight
/// wait for that same probe. The outcome is kept for the life of the process.
pub struct Capability<M> {
    model: Option<Arc<M>>,
    session: OnceCell<Option<Arc<M>>>,
    probing: AtomicBool,
    probe_timeout: Duration,
}

impl<M: LanguageModel> Capability<M> {
    pub fn new(model: Option<M>, probe_timeout: Duration) -> Self {
        Self {
            model: model.map(Arc::new),
            session: OnceCell::new(),
            probing: AtomicBool::new(false),
            probe_timeout,
        }
    }

    pub fn state(&self) -> CapabilityState {
        match self.session.get() {
            Some(Some(_)) => CapabilityState::Ready,
            Some(None) => CapabilityState::Unavailable,
            None if self.probing.load(Ordering::Acquire) => CapabilityState::Probing,
            None => CapabilityState::Uninitialized,
        }
    }

    /// The ready model, or `None` if it is unavailable.
    pub async fn session(&self) -> Option<Arc<M>> {
        self.session.get_or_init(|| self.probe()).await.clone()
    }

    async fn probe(&self) -> Option<Arc<M>> {
        let Some(model) = &self.model else {
            tracing::warn!("No generative model configured, using local fallbacks");
            return None;
        };

        self.probing.store(true, Ordering::Release);

        match tokio::time::timeout(self.probe_timeout, Self::prepare(model)).await {
            Ok(Ok(())) => {
                tracing::info!("Generative model {} ready", model.name());
                Some(Arc::clone(model))
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "Generative model {} unavailable ({}), using local fallbacks",
                    model.name(),
                    e
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Generative model {} did not become ready within {:?}, using local fallbacks",
                    model.name(),
                    self.probe_timeout
                );
                None
            }
        }
    }

    async fn prepare(model: &M) -> Result<()> {
        match model.availability().await? {
            Availability::Readily => Ok(()),
            Availability::AfterDownload => {
                tracing::info!("Downloading model {} (this may take a few minutes)", model.name());
                model.download().await
            }
            Availability::No => Err(AppError::Ai(format!(
                "model {} is not available on this device",
                model.name()
            ))),
        }
    }
}
