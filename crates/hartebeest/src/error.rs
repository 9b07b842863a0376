//! Outcome codes and the compound error type returned from every public operation.

use std::fmt;

/// Dense outcome taxonomy spanning every component: device manager, resource
/// cache, registries, configuration loader, QP state machine, and the two
/// exchangers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Retcode {
    DeviceUnavailable = 1,
    PortInactive,
    NotInfiniBand,

    NameExists,
    NameMissing,
    PdMissing,

    Oom,
    ProviderRefused,

    TransitionInitFailed,
    TransitionRtrFailed,
    TransitionRtsFailed,
    StateDrift,

    CfgFileMissing,
    EnvVarMissing,
    CfgParseError,

    ExchangeSocketError,
    ExchangeParseError,

    KvSetFailed,
    KvGetFailed,
    KvDelFailed,

    Timeout,
    BadWorkRequest,
    CompletionFailure,
}

impl Retcode {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::DeviceUnavailable => "device manager: device index out of range or driver refused open",
            Self::PortInactive => "device manager: port phys_state is neither ACTIVE nor ACTIVE_DEFER",
            Self::NotInfiniBand => "device manager: port link layer is not InfiniBand",
            Self::NameExists => "registry: name already registered in this scope",
            Self::NameMissing => "registry: name not found in this scope",
            Self::PdMissing => "pd registry: protection domain not found",
            Self::Oom => "allocation failed",
            Self::ProviderRefused => "verbs provider returned an error",
            Self::TransitionInitFailed => "qp state machine: RESET to INIT transition failed",
            Self::TransitionRtrFailed => "qp state machine: INIT to RTR transition failed",
            Self::TransitionRtsFailed => "qp state machine: RTR to RTS transition failed",
            Self::StateDrift => "qp state machine: provider state disagrees with shadow state",
            Self::CfgFileMissing => "config loader: attribute file not found",
            Self::EnvVarMissing => "config loader: required environment variable not set",
            Self::CfgParseError => "config loader: attribute file is not valid JSON",
            Self::ExchangeSocketError => "socket exchanger: connection or I/O error",
            Self::ExchangeParseError => "socket exchanger: network view did not parse",
            Self::KvSetFailed => "kv exchanger: SET failed",
            Self::KvGetFailed => "kv exchanger: GET failed",
            Self::KvDelFailed => "kv exchanger: DEL failed",
            Self::Timeout => "kv exchanger: barrier exceeded its retry budget",
            Self::BadWorkRequest => "qp: malformed send or receive work request",
            Self::CompletionFailure => "cq: work completion carried a non-SUCCESS status",
        }
    }
}

impl fmt::Display for Retcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A code plus optional appended context, e.g. the failing resource name.
///
/// Mirrors the original `hb_retcode` struct's `{ret_code, aux_str}` shape;
/// `append_str` there is modeled here by constructing a fresh [`Error`] with
/// `with_context` rather than mutating in place.
#[derive(Debug, thiserror::Error)]
#[error("{code}{}", aux.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
pub struct Error {
    pub code: Retcode,
    pub aux: Option<String>,
}

impl Error {
    #[must_use]
    pub fn new(code: Retcode) -> Self {
        Self { code, aux: None }
    }

    #[must_use]
    pub fn with_context(code: Retcode, aux: impl Into<String>) -> Self {
        Self {
            code,
            aux: Some(aux.into()),
        }
    }
}

impl From<Retcode> for Error {
    fn from(code: Retcode) -> Self {
        Self::new(code)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_with_context_is_appended() {
        let err = Error::with_context(Retcode::NameExists, "mr-1");
        assert_eq!(err.to_string(), "registry: name already registered in this scope: mr-1");
    }

    #[test]
    fn message_without_context_has_no_colon() {
        let err = Error::new(Retcode::Oom);
        assert_eq!(err.to_string(), "allocation failed");
    }
}
