//! Single-flight credential renewal.
//!
//! When a request comes back 401 the middleware hands it to the
//! [`RefreshCoordinator`]. The first such request starts a renewal; every
//! request that fails while that renewal is in flight is queued behind it.
//! When the renewal settles the queue is flushed in arrival order, either
//! with the original requests re-authorized with the new access token or
//! with a terminal [`AuthError::SessionExpired`].

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::credentials::{CredentialPair, CredentialStore};
use super::error::{AuthError, RenewalError, TerminalCause};
use super::navigation::Navigator;
use super::renewal::RenewalClient;

type Resumption = Result<Request, AuthError>;

/// A request that failed authentication and is waiting to be retried.
pub struct PendingRequest {
    request: Request,
    sent_with: Option<String>,
}

impl PendingRequest {
    /// `sent_with` is the access token the request carried when it failed.
    pub fn new(request: Request, sent_with: Option<String>) -> Self {
        Self { request, sent_with }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

struct Waiter {
    request: Request,
    resume: oneshot::Sender<Resumption>,
}

enum RenewalState {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
}

/// What a failing request gets when it reaches the coordinator.
enum Admission {
    Queued(oneshot::Receiver<Resumption>),
    StartRenewal {
        refresh_token: String,
        receiver: oneshot::Receiver<Resumption>,
    },
    AlreadyRenewed {
        request: Request,
        access_token: String,
    },
    NoCredential,
}

/// Owns the renewal state machine. Share it behind an `Arc` between every
/// middleware instance that talks to the same backend.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    renewer: Arc<dyn RenewalClient>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<RenewalState>,
    renewals: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        renewer: Arc<dyn RenewalClient>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            store,
            renewer,
            navigator,
            state: Mutex::new(RenewalState::Idle),
            renewals: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RenewalState::Refreshing { .. })
    }

    /// Number of requests queued behind the in-flight renewal.
    pub fn pending_waiters(&self) -> usize {
        match &*self.state.lock() {
            RenewalState::Idle => 0,
            RenewalState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Renewal calls started since this coordinator was created.
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Renew-or-wait for a request that came back 401.
    ///
    /// Resolves to the original request carrying the fresh bearer token, to
    /// be sent exactly once more, or to the terminal error that ended the
    /// session. Dropping the returned future abandons the retry without
    /// affecting the renewal or the other waiters.
    pub async fn handle_auth_failure(
        self: &Arc<Self>,
        pending: PendingRequest,
    ) -> Result<Request, AuthError> {
        let receiver = match self.admit(pending) {
            Admission::Queued(receiver) => receiver,
            Admission::StartRenewal {
                refresh_token,
                receiver,
            } => {
                let coordinator = Arc::clone(self);
                tokio::spawn(async move { coordinator.run_renewal(refresh_token).await });
                receiver
            }
            Admission::AlreadyRenewed {
                request,
                access_token,
            } => {
                debug!(url = %request.url(), "Credentials renewed since request was sent, retrying");
                return authorize(request, &access_token);
            }
            Admission::NoCredential => {
                let cause = TerminalCause::NoCredential;
                self.clear_store();
                self.end_session(&cause, VecDeque::new());
                return Err(AuthError::SessionExpired(cause));
            }
        };

        match receiver.await {
            Ok(resumption) => resumption,
            // Only reachable if the renewal task was torn down with the runtime
            Err(_) => Err(AuthError::SessionExpired(TerminalCause::NetworkUnavailable(
                "renewal abandoned before settling".to_string(),
            ))),
        }
    }

    fn admit(&self, pending: PendingRequest) -> Admission {
        let PendingRequest { request, sent_with } = pending;
        let mut state = self.state.lock();

        if let RenewalState::Refreshing { waiters } = &mut *state {
            let (resume, receiver) = oneshot::channel();
            waiters.push_back(Waiter { request, resume });
            debug!(waiters = waiters.len(), "Renewal in flight, request queued");
            return Admission::Queued(receiver);
        }

        if let Some(access_token) = self.store.access_token() {
            if sent_with.as_deref() != Some(access_token.as_str()) {
                return Admission::AlreadyRenewed {
                    request,
                    access_token,
                };
            }
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            return Admission::NoCredential;
        };

        let (resume, receiver) = oneshot::channel();
        let mut waiters = VecDeque::new();
        waiters.push_back(Waiter { request, resume });
        *state = RenewalState::Refreshing { waiters };
        self.renewals.fetch_add(1, Ordering::Relaxed);
        info!("Access token rejected, starting renewal");

        Admission::StartRenewal {
            refresh_token,
            receiver,
        }
    }

    async fn run_renewal(self: Arc<Self>, refresh_token: String) {
        let outcome = AssertUnwindSafe(self.renewer.renew(&refresh_token))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(RenewalError::InvalidResponse(
                    "renewal client panicked".to_string(),
                ))
            });

        match outcome {
            Ok(pair) => self.complete(pair),
            Err(err) => {
                warn!(error = %err, "Token renewal failed, ending session");
                // The store must be empty before the state leaves Refreshing
                self.clear_store();
                let waiters = self.settle();
                self.end_session(&TerminalCause::from(err), waiters);
            }
        }
    }

    fn complete(&self, pair: CredentialPair) {
        // The store must hold the new pair before anyone retries with it
        if let Err(e) = self.store.set(&pair) {
            warn!(error = %e, "Failed to persist renewed credentials");
        }

        let waiters = self.settle();
        info!(waiters = waiters.len(), "Token renewed, resuming queued requests");

        for waiter in waiters {
            let resumption = authorize(waiter.request, &pair.access_token);
            if waiter.resume.send(resumption).is_err() {
                debug!("Queued request dropped before renewal settled");
            }
        }
    }

    /// Return to `Idle`, handing back whoever was queued.
    fn settle(&self) -> VecDeque<Waiter> {
        match std::mem::replace(&mut *self.state.lock(), RenewalState::Idle) {
            RenewalState::Refreshing { waiters } => waiters,
            RenewalState::Idle => VecDeque::new(),
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
    }

    /// Reject `waiters` with `cause` and send the user back to login.
    fn end_session(&self, cause: &TerminalCause, waiters: VecDeque<Waiter>) {
        for waiter in waiters {
            let rejection = Err(AuthError::SessionExpired(cause.clone()));
            if waiter.resume.send(rejection).is_err() {
                debug!("Queued request dropped before renewal settled");
            }
        }

        self.navigator.redirect_to_login();
    }
}

/// Set `Authorization: Bearer <token>` on a request, replacing any previous value.
pub fn authorize(mut request: Request, access_token: &str) -> Result<Request, AuthError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|_| AuthError::MalformedToken)?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}
