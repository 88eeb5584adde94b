//! Status classes.
//!
//! Logs and metrics care about the class of a response, not the exact code.
//! Responses themselves use [`http::StatusCode`] directly.

use std::fmt;

use http::StatusCode;

/// The outcome class of a request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusClass {
    /// 1xx, 2xx and 3xx.
    Success,
    /// 4xx, except 499.
    ClientError,
    /// 5xx.
    ServerError,
    /// The request was abandoned before a response was written (499).
    Cancelled,
}

impl StatusClass {
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            499 => Self::Cancelled,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Success,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success     => "success",
            Self::ClientError => "4xx",
            Self::ServerError => "5xx",
            Self::Cancelled   => "cancelled",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_codes() {
        assert_eq!(StatusClass::of(StatusCode::OK), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::FOUND), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::BAD_REQUEST), StatusClass::ClientError);
        assert_eq!(StatusClass::of(StatusCode::NOT_FOUND), StatusClass::ClientError);
        assert_eq!(StatusClass::of(StatusCode::from_u16(499).unwrap()), StatusClass::Cancelled);
        assert_eq!(StatusClass::of(StatusCode::BAD_GATEWAY), StatusClass::ServerError);
    }
}
