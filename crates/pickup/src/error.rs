use thiserror::Error;

use foodrescue_core::OrderId;

/// Why a presented token was refused. Logged, never shown to the presenter.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("unknown token")]
    Unknown,
    #[error("token already used")]
    AlreadyUsed,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("pickup token rejected: {0}")]
    Rejected(TokenRejection),

    #[error("a pickup token was already issued for order {0}")]
    AlreadyIssued(OrderId),
}
