/// Terminal failure of a fan-out fetch. At most one of these is kept per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The input string is not a URL at all.
    BadUrl { url: String, detail: String },
    /// The remote answered >= 400, or the request/transport/read failed.
    Unprocessable { url: String, detail: String },
    /// The per-request deadline (or the caller's deadline) elapsed.
    Timeout { url: String },
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadUrl,
    Unprocessable,
    Timeout,
    Internal,
}

impl FetchError {
    pub fn bad_url<U: Into<String>, D: ToString>(url: U, detail: D) -> Self {
        Self::BadUrl {
            url: url.into(),
            detail: detail.to_string(),
        }
    }

    pub fn unprocessable<U: Into<String>, D: ToString>(url: U, detail: D) -> Self {
        Self::Unprocessable {
            url: url.into(),
            detail: detail.to_string(),
        }
    }

    pub fn timeout<U: Into<String>>(url: U) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn internal<S: AsRef<str>>(msg: S) -> Self
    where
        String: From<S>,
    {
        Self::Internal(String::from(msg))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::BadUrl { .. } => ErrorKind::BadUrl,
            FetchError::Unprocessable { .. } => ErrorKind::Unprocessable,
            FetchError::Timeout { .. } => ErrorKind::Timeout,
            FetchError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The offending URL, when the failure belongs to one.
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::BadUrl { url, .. }
            | FetchError::Unprocessable { url, .. }
            | FetchError::Timeout { url } => Some(url),
            FetchError::Internal(_) => None,
        }
    }
}

impl core::error::Error for FetchError {}

impl core::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::BadUrl { url, detail } => write!(f, "url item: {url}: {detail}: bad url"),
            FetchError::Unprocessable { url, detail } => {
                write!(f, "url item: {url}: {detail}: unprocessable entity")
            }
            FetchError::Timeout { url } => write!(f, "url item = {url}: deadline exceeded"),
            FetchError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}
