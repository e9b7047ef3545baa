//! Cancellation and deadline carried by every outbound operation.
//!
//! A [`CallContext`] is cheap to clone and is passed by reference into the
//! facade. Waiting on the rate limiter and waiting on the network both go
//! through [`CallContext::run`], so a cancelled or expired context returns
//! promptly with a cancellation-kind [`AclError`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::AclError;

/// Cancellation signal and optional deadline for one logical call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Handle that cancels every context derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CallContext {
    /// A context that never cancels and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a cancellable context and the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    /// Derive a context that expires `timeout` from now.
    ///
    /// An earlier existing deadline is kept.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        self.with_deadline_opt(candidate)
    }

    /// Derive a context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        self.with_deadline_opt(Some(deadline))
    }

    fn with_deadline_opt(&self, candidate: Option<Instant>) -> Self {
        let deadline = match (self.deadline, candidate) {
            (Some(existing), Some(new)) => Some(existing.min(new)),
            (existing, None) => existing,
            (None, new) => new,
        };
        Self {
            deadline,
            cancel: self.cancel.clone(),
        }
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation-kind error if the context has already fired.
    ///
    /// # Errors
    ///
    /// [`AclError::Cancelled`] or [`AclError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), AclError> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(AclError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AclError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context fires first.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Cancelled`] or [`AclError::DeadlineExceeded`]
    /// when the context fires before `fut` completes; `fut` is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, AclError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(AclError::Cancelled),
            () = self.expired() => Err(AclError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }

    /// Resolves once cancellation is signalled; pends forever otherwise.
    async fn cancelled(&self) {
        let Some(rx) = self.cancel.as_ref() else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling.
                return std::future::pending().await;
            }
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
