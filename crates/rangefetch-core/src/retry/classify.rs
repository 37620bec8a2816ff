//! Classify curl errors and attempt failures into retry policy error kinds.

use crate::retry::error::FetchError;
use crate::retry::policy::ErrorKind;

/// Classify a curl error for retry decisions.
///
/// Timeouts and connection-level failures (refused, reset, empty reply,
/// truncated body) are transient. Everything else (bad URL, TLS setup,
/// unsupported protocol, ...) is permanent.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    if e.is_aborted_by_callback() {
        return ErrorKind::Cancelled;
    }
    ErrorKind::Other
}

/// Classify an attempt error into an ErrorKind.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Curl(ce) => classify_curl_error(ce),
        FetchError::PartialTransfer { .. } => ErrorKind::Connection,
        FetchError::Http(_) | FetchError::RangeIgnored { .. } | FetchError::Storage(_) => {
            ErrorKind::Other
        }
        FetchError::Cancelled => ErrorKind::Cancelled,
        FetchError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
    }
}
