//! Command handlers

pub mod customer;
pub mod ledger;
pub mod points;
pub mod report;

use loyalty_business::BusinessError;

/// Turn an engine error into a CLI error.
///
/// Rejections keep their message and reason code; fatal failures are
/// logged in full and shown generically.
pub fn engine_error(err: BusinessError) -> anyhow::Error {
    if err.is_fatal() {
        tracing::error!(kind = ?err.kind(), reason = err.reason_code(), error = %err, "Ledger operation failed");
    }
    anyhow::anyhow!("{} [{}]", err.public_message(), err.reason_code())
}
