//! Results handed back by the platform store.

use serde::{Deserialize, Serialize};

use storefront_core::Transaction;

/// Why the platform refused to vouch for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum VerificationFailure {
    InvalidSignature,
    InvalidCertificateChain,
    RevokedCertificate,
    InvalidEncoding,
    Other(String),
}

impl core::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VerificationFailure::InvalidSignature => f.write_str("invalid signature"),
            VerificationFailure::InvalidCertificateChain => {
                f.write_str("invalid certificate chain")
            }
            VerificationFailure::RevokedCertificate => f.write_str("revoked certificate"),
            VerificationFailure::InvalidEncoding => f.write_str("invalid encoding"),
            VerificationFailure::Other(reason) => f.write_str(reason),
        }
    }
}

/// A transaction together with the store's verdict on it.
///
/// The transaction payload is available either way; only a `Verified` one may
/// change what the user owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    Verified {
        transaction: Transaction,
    },
    Unverified {
        transaction: Transaction,
        failure: VerificationFailure,
    },
}

impl VerificationResult {
    pub fn verified(transaction: Transaction) -> Self {
        Self::Verified { transaction }
    }

    pub fn unverified(transaction: Transaction, failure: VerificationFailure) -> Self {
        Self::Unverified {
            transaction,
            failure,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Verified { transaction } | Self::Unverified { transaction, .. } => transaction,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Outcome of asking the store to buy a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Success { result: VerificationResult },
    UserCancelled,
    /// Awaiting approval outside the app; the transaction arrives later
    /// through the update stream.
    Pending,
    /// A result this client does not recognise.
    Unknown,
}

impl PurchaseOutcome {
    pub fn success(result: VerificationResult) -> Self {
        Self::Success { result }
    }
}
