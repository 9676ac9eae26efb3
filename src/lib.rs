// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! SubPirate backend: identity, subscription gating and Reddit account
//! linking.
//!
//! Requests pass through identity resolution (with background profile
//! sync), then the subscription gate, then the route guard. Reddit accounts
//! are linked through an OAuth callback state machine.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use error::AppError;
use services::{CodeLedger, RedditClient, RedditService, SessionSync, SubscriptionGate, TokenCipher};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub session_sync: SessionSync,
    pub subscription_gate: SubscriptionGate,
    pub reddit: RedditService,
    pub code_ledger: CodeLedger,
}

impl AppState {
    /// Wire up services over an already-connected database.
    pub fn new(config: Config, db: Database) -> Result<Self, AppError> {
        let cipher = TokenCipher::new(&config.token_encryption_key)?;
        let client = RedditClient::new(&config)?;

        Ok(Self {
            session_sync: SessionSync::new(db.clone()),
            subscription_gate: SubscriptionGate::new(db.clone()),
            reddit: RedditService::new(client, db.clone(), cipher),
            code_ledger: CodeLedger::new(),
            db,
            config,
        })
    }
}
