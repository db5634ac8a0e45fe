//! Rust client for the Plaid Connect API.
//! Submits institution credentials, walks MFA challenges, and fetches
//! linked accounts and transactions as typed models.

pub mod client;
pub mod error;
pub mod models;

pub use client::{Client, Environment};
pub use error::{ApiError, ApiErrorKind, PlaidError};
pub use models::{
    Account, ConnectGetOptions, ConnectOptions, ConnectOutcome, ConnectResponse, Credentials,
    DeleteResponse, MfaChallenge, MfaResponse, Transaction,
};
