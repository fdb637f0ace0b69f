//! Cancellation for suspending operations.
//!
//! [`cancellation`] returns a handle and a token. Passing the token to a
//! suspending session call makes its backing-store round trip abortable;
//! calling [`CancelHandle::cancel`] aborts it and the call fails with
//! [`DocumentStoreError::Cancelled`]. Row mapping happens only after the
//! round trip completes, so a cancelled call never touches the identity map.

use std::future::Future;

use futures::future::{AbortHandle, AbortRegistration, Abortable};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Aborts the operation its paired [`CancelToken`] was given to.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    handle: AbortHandle,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

/// Single-use cancellation signal accepted by suspending operations.
#[derive(Debug)]
pub struct CancelToken {
    registration: AbortRegistration,
}

/// Creates a connected handle and token.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (handle, registration) = AbortHandle::new_pair();
    (CancelHandle { handle }, CancelToken { registration })
}

/// Awaits `future`, aborting it if `token` is cancelled first.
pub(crate) async fn with_cancel<F, T>(token: Option<CancelToken>, future: F) -> DocumentStoreResult<T>
where
    F: Future<Output = DocumentStoreResult<T>>,
{
    match token {
        Some(token) => Abortable::new(future, token.registration)
            .await
            .map_err(|_| DocumentStoreError::Cancelled)?,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_before_start_fails_fast() {
        let (handle, token) = cancellation();
        handle.cancel();

        let result = with_cancel(Some(token), async { Ok(1) }).await;

        assert!(handle.is_cancelled());
        assert!(matches!(result, Err(DocumentStoreError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_aborts_a_pending_round_trip() {
        let (handle, token) = cancellation();

        let pending = with_cancel(Some(token), futures::future::pending::<DocumentStoreResult<()>>());
        let cancel = async {
            tokio::task::yield_now().await;
            handle.cancel();
        };

        let (result, ()) = tokio::join!(pending, cancel);
        assert!(matches!(result, Err(DocumentStoreError::Cancelled)));
    }

    #[tokio::test]
    async fn no_token_runs_to_completion() {
        assert_eq!(with_cancel(None, async { Ok(5) }).await.unwrap(), 5);
    }
}
