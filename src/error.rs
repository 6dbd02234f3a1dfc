use thiserror::Error;

/// An upstream fetch failed. `status` is `None` when no HTTP response was received.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "GitHub request failed{}: {message}",
    .status.map(|status| format!(" with status {status}")).unwrap_or_default()
)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// A fetched record lacked a field needed to derive its node id.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("malformed {kind} record: missing `{field}`")]
pub struct MalformedPayload {
    pub kind: &'static str,
    pub field: &'static str,
}

/// The simulation hit its tick or time cap before alpha decayed.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("layout did not converge within {ticks} ticks (alpha {alpha:.4})")]
pub struct LayoutStall {
    pub ticks: usize,
    pub alpha: f32,
}
