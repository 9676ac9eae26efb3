// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reddit OAuth callback state machine.
//!
//! ```text
//! Idle -> ExchangingCode -> FetchingUser -> Persisting -> Done
//!   \__________\________________\______________\______> Error
//! ```
//!
//! `Error` absorbs: once entered, no further transition is accepted. A code
//! that was already exchanged ends the flow in `Done` with a `Duplicate`
//! outcome and no error.

use crate::models::{Identity, RedditAccountSummary};
use crate::services::oauth_state::{verify_state, StateError};
use crate::services::reddit::{RedditError, RedditService};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a claimed code is remembered.
const CODE_LEDGER_TTL: Duration = Duration::from_secs(10 * 60);

/// Phase of one callback run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Idle,
    ExchangingCode,
    FetchingUser,
    Persisting,
    Done,
    Error,
}

impl CallbackPhase {
    fn can_advance_to(self, next: CallbackPhase) -> bool {
        use CallbackPhase::*;
        matches!(
            (self, next),
            (Idle, ExchangingCode)
                | (ExchangingCode, FetchingUser)
                | (FetchingUser, Persisting)
                | (Persisting, Done)
                // Entry-guard duplicates and already-used codes end quietly.
                | (Idle, Done)
                | (ExchangingCode, Done)
                | (Idle | ExchangingCode | FetchingUser | Persisting, Error)
        )
    }
}

impl fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackPhase::Idle => "idle",
            CallbackPhase::ExchangingCode => "exchanging_code",
            CallbackPhase::FetchingUser => "fetching_user",
            CallbackPhase::Persisting => "persisting",
            CallbackPhase::Done => "done",
            CallbackPhase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why a callback failed. Each variant has a short code for the frontend.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Reddit denied authorization: {0}")]
    ProviderDenied(String),

    #[error("callback is missing code or state")]
    MissingParams,

    #[error("callback parameters are malformed: {0}")]
    InvalidParams(String),

    #[error("state mismatch: {0}")]
    StateMismatch(String),

    #[error("token exchange failed: {0}")]
    Exchange(RedditError),

    #[error("fetching Reddit user failed: {0}")]
    UserInfo(RedditError),

    #[error("saving Reddit account failed: {0}")]
    Persist(String),

    #[error("callback flow already ran")]
    AlreadyRan,
}

impl CallbackError {
    /// Short code passed to the frontend's retry screen.
    pub fn code(&self) -> &'static str {
        match self {
            CallbackError::ProviderDenied(_) => "access_denied",
            CallbackError::MissingParams => "missing_params",
            CallbackError::InvalidParams(_) => "invalid_params",
            CallbackError::StateMismatch(_) => "state_mismatch",
            CallbackError::Exchange(_) => "token_exchange_failed",
            CallbackError::UserInfo(_) => "user_fetch_failed",
            CallbackError::Persist(_) => "save_failed",
            CallbackError::AlreadyRan => "already_ran",
        }
    }
}

/// Terminal result of one callback run.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// Account linked (or re-linked).
    Connected(RedditAccountSummary),
    /// The code was already exchanged; nothing to do and nothing to report.
    Duplicate,
    Failed(CallbackError),
}

/// Query parameters Reddit sends to the callback.
#[derive(Debug, Default, Clone)]
pub struct CallbackRequest {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Remembers authorization codes that were already handed to a flow.
///
/// Shared across requests so a double-submitted callback never exchanges the
/// same code twice.
#[derive(Clone, Default)]
pub struct CodeLedger {
    claimed: Arc<DashMap<String, Instant>>,
}

impl CodeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `code` was claimed within the TTL.
    pub fn is_claimed(&self, code: &str) -> bool {
        self.claimed
            .get(code)
            .is_some_and(|claimed_at| claimed_at.elapsed() < CODE_LEDGER_TTL)
    }

    /// Claim `code`. Returns false if it was claimed within the TTL.
    pub fn try_claim(&self, code: &str) -> bool {
        let now = Instant::now();
        self.claimed
            .retain(|_, claimed_at| now.duration_since(*claimed_at) < CODE_LEDGER_TTL);

        match self.claimed.entry(code.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}

/// One run of the callback state machine.
pub struct CallbackFlow<'a> {
    reddit: &'a RedditService,
    ledger: &'a CodeLedger,
    state_key: &'a [u8],
    phase: CallbackPhase,
}

impl<'a> CallbackFlow<'a> {
    pub fn new(reddit: &'a RedditService, ledger: &'a CodeLedger, state_key: &'a [u8]) -> Self {
        Self {
            reddit,
            ledger,
            state_key,
            phase: CallbackPhase::Idle,
        }
    }

    pub fn phase(&self) -> CallbackPhase {
        self.phase
    }

    fn advance(&mut self, next: CallbackPhase) {
        if !self.phase.can_advance_to(next) {
            tracing::error!(from = %self.phase, to = %next, "Invalid callback transition ignored");
            return;
        }
        tracing::debug!(from = %self.phase, to = %next, "Callback phase");
        self.phase = next;
    }

    fn fail(&mut self, err: CallbackError) -> CallbackOutcome {
        tracing::warn!(phase = %self.phase, error = %err, "Reddit callback failed");
        self.advance(CallbackPhase::Error);
        CallbackOutcome::Failed(err)
    }

    fn duplicate(&mut self, reason: &str) -> CallbackOutcome {
        tracing::info!(phase = %self.phase, reason, "Duplicate Reddit callback ignored");
        self.advance(CallbackPhase::Done);
        CallbackOutcome::Duplicate
    }

    /// Drive the flow to a terminal phase.
    ///
    /// `stashed_state` is the value saved when the authorization redirect was
    /// issued. A mismatch aborts before any call to Reddit. With no stashed
    /// value (the cookie is cleared after the first run) only a replay of an
    /// already claimed code with a valid signed state is accepted, as a
    /// `Duplicate`.
    pub async fn run(
        &mut self,
        user: &Identity,
        request: &CallbackRequest,
        stashed_state: Option<&str>,
    ) -> CallbackOutcome {
        if self.phase != CallbackPhase::Idle {
            return CallbackOutcome::Failed(CallbackError::AlreadyRan);
        }

        // ─── Entry guard ─────────────────────────────────────────
        if let Some(error) = &request.error {
            return self.fail(CallbackError::ProviderDenied(error.clone()));
        }

        let (Some(code), Some(state)) = (request.code.as_deref(), request.state.as_deref())
        else {
            return self.fail(CallbackError::MissingParams);
        };

        let stashed = match stashed_state {
            Some(stashed) if stashed == state => true,
            Some(_) => {
                return self.fail(CallbackError::StateMismatch(
                    "does not match the stashed value".to_string(),
                ))
            }
            None => false,
        };

        if let Err(e) = verify_state(state, &user.id, self.state_key) {
            let reason = match e {
                StateError::WrongUser => "issued for another user".to_string(),
                other => other.to_string(),
            };
            return self.fail(CallbackError::StateMismatch(reason));
        }

        if !stashed {
            if self.ledger.is_claimed(code) {
                return self.duplicate("replay after state cookie was cleared");
            }
            return self.fail(CallbackError::StateMismatch(
                "no state was stashed for this session".to_string(),
            ));
        }

        if !self.ledger.try_claim(code) {
            return self.duplicate("code already claimed");
        }

        // ─── Token exchange ──────────────────────────────────────
        self.advance(CallbackPhase::ExchangingCode);
        let tokens = match self.reddit.client().exchange_code(code).await {
            Ok(tokens) => tokens,
            // Cannot tell a double-submit from a revoked code; treated as
            // the former.
            Err(RedditError::CodeAlreadyUsed) => return self.duplicate("invalid_grant"),
            Err(e) => return self.fail(CallbackError::Exchange(e)),
        };

        // ─── User info ───────────────────────────────────────────
        self.advance(CallbackPhase::FetchingUser);
        let me = match self.reddit.client().fetch_me(&tokens.access_token).await {
            Ok(me) => me,
            Err(e) => return self.fail(CallbackError::UserInfo(e)),
        };

        // ─── Persistence ─────────────────────────────────────────
        self.advance(CallbackPhase::Persisting);
        let account = match self.reddit.persist_connection(&user.id, &tokens, &me).await {
            Ok(account) => account,
            Err(e) => return self.fail(CallbackError::Persist(e.to_string())),
        };

        self.advance(CallbackPhase::Done);
        tracing::info!(user_id = %user.id, username = %account.username, "Reddit account connected");
        CallbackOutcome::Connected(account.summary())
    }
}
