//! Classification of store verification results.
//!
//! Pure functions, no side effects. The purchase flow, `is_purchased` and the
//! transaction listener all go through here so they agree on what counts as
//! verified.

use storefront_core::Transaction;
use storefront_storekit::{VerificationFailure, VerificationResult};

use crate::error::VerificationError;

/// Verdict carried by a [`VerificationResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    Unverified(VerificationFailure),
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationStatus::Verified)
    }
}

/// Split a result into its verdict and the underlying transaction.
///
/// The transaction is returned either way so callers can log or acknowledge
/// it; only a `Verified` verdict may be used to grant access.
pub fn check_verified(result: VerificationResult) -> (VerificationStatus, Transaction) {
    match result {
        VerificationResult::Verified { transaction } => (VerificationStatus::Verified, transaction),
        VerificationResult::Unverified {
            transaction,
            failure,
        } => (VerificationStatus::Unverified(failure), transaction),
    }
}

/// The transaction if verified, a [`VerificationError`] naming it otherwise.
pub fn into_verified(result: VerificationResult) -> Result<Transaction, VerificationError> {
    match check_verified(result) {
        (VerificationStatus::Verified, transaction) => Ok(transaction),
        (VerificationStatus::Unverified(failure), transaction) => Err(VerificationError {
            product_id: transaction.product_id,
            transaction_id: transaction.id,
            failure,
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use storefront_core::{ProductId, ProductKind, TransactionId};

    use super::*;

    fn test_transaction() -> Transaction {
        Transaction::new(
            TransactionId::new(11),
            ProductId::new("nav.pro").unwrap(),
            ProductKind::NonConsumable,
            Utc::now(),
        )
    }

    #[test]
    fn verified_result_unwraps_transaction() {
        let tx = test_transaction();

        let (status, unwrapped) = check_verified(VerificationResult::verified(tx.clone()));

        assert!(status.is_verified());
        assert_eq!(unwrapped, tx);
    }

    #[test]
    fn unverified_result_still_unwraps_transaction() {
        let tx = test_transaction();

        let (status, unwrapped) = check_verified(VerificationResult::unverified(
            tx.clone(),
            VerificationFailure::RevokedCertificate,
        ));

        assert_eq!(
            status,
            VerificationStatus::Unverified(VerificationFailure::RevokedCertificate)
        );
        assert_eq!(unwrapped, tx);
    }

    #[test]
    fn into_verified_names_the_rejected_transaction() {
        let tx = test_transaction();

        let err = into_verified(VerificationResult::unverified(
            tx.clone(),
            VerificationFailure::InvalidSignature,
        ))
        .unwrap_err();

        assert_eq!(err.product_id, tx.product_id);
        assert_eq!(err.transaction_id, tx.id);
        assert_eq!(err.failure, VerificationFailure::InvalidSignature);
        assert_eq!(
            err.to_string(),
            "transaction 11 for nav.pro failed verification: invalid signature"
        );
    }

    #[test]
    fn into_verified_passes_verified_through() {
        let tx = test_transaction();
        assert_eq!(into_verified(VerificationResult::verified(tx.clone())), Ok(tx));
    }
}
