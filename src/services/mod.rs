// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod oauth_callback;
pub mod oauth_state;
pub mod reddit;
pub mod retry;
pub mod session_sync;
pub mod subscription_gate;
pub mod token_cipher;

pub use oauth_callback::{CallbackFlow, CallbackOutcome, CallbackRequest, CodeLedger};
pub use reddit::{RedditClient, RedditError, RedditService};
pub use retry::RetryConfig;
pub use session_sync::SessionSync;
pub use subscription_gate::SubscriptionGate;
pub use token_cipher::TokenCipher;
