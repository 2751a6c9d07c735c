use tokio::io::{AsyncRead, AsyncReadExt};

use crate::init::shutdown::GracefulShutdown;

const MAX_HEADER_BYTES: usize = 32 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
pub enum ReadError {
    Malformed(String),
    HeadTooLarge,
    BodyTooLarge(usize),
    Io(std::io::Error),
}

impl ReadError {
    pub fn status(&self) -> u16 {
        match self {
            ReadError::BodyTooLarge(_) => 413,
            _ => 400,
        }
    }
}

impl core::error::Error for ReadError {}

impl core::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Malformed(msg) => write!(f, "malformed request: {msg}"),
            ReadError::HeadTooLarge => write!(f, "request headers too large"),
            ReadError::BodyTooLarge(len) => write!(f, "request body too large: {len} bytes"),
            ReadError::Io(e) => write!(f, "read request: {e}"),
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Reads one request (head and `Content-Length` body).
///
/// `Ok(None)` means there is nothing to answer: the peer closed before sending
/// anything, or shutdown started while we were still reading.
pub async fn read_request<R: AsyncRead + Unpin>(
    stream: &mut R,
    shutdown: &GracefulShutdown,
) -> Result<Option<Request>, ReadError> {
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut tmp = [0u8; 4096];

    let (mut request, content_length, header_end) = loop {
        let n = match read_or_shutdown(stream, &mut tmp, shutdown).await? {
            Some(n) => n,
            None => return Ok(None),
        };
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ReadError::Malformed(
                "peer closed connection while reading request".into(),
            ));
        }
        buf.extend_from_slice(&tmp[..n]);

        if let Some(parsed) = parse_head(&buf)? {
            break parsed;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(ReadError::HeadTooLarge);
        }
    };

    if request
        .header_value("Transfer-Encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        return Err(ReadError::Malformed(
            "chunked transfer-encoding is not supported".into(),
        ));
    }

    let body_len = content_length.unwrap_or(0);
    if body_len > MAX_BODY_BYTES {
        return Err(ReadError::BodyTooLarge(body_len));
    }

    let mut body: Vec<u8> = Vec::with_capacity(body_len);
    body.extend_from_slice(&buf[header_end..]);
    while body.len() < body_len {
        let n = match read_or_shutdown(stream, &mut tmp, shutdown).await? {
            Some(n) => n,
            None => return Ok(None),
        };
        if n == 0 {
            return Err(ReadError::Malformed(
                "peer closed connection while reading body".into(),
            ));
        }
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(body_len);

    request.body = body;
    Ok(Some(request))
}

/// `Ok(None)` while the head is still incomplete.
fn parse_head(buf: &[u8]) -> Result<Option<(Request, Option<usize>, usize)>, ReadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let header_end = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(ReadError::Malformed(e.to_string())),
    };

    let headers = req
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_owned(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect::<Vec<_>>();

    let content_length = match headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
    {
        Some((_, v)) => Some(
            v.trim()
                .parse::<usize>()
                .map_err(|_| ReadError::Malformed(format!("invalid content-length: {v}")))?,
        ),
        None => None,
    };

    let request = Request {
        method: req.method.unwrap_or("GET").to_owned(),
        path: req.path.unwrap_or("/").to_owned(),
        headers,
        body: Vec::new(),
    };
    Ok(Some((request, content_length, header_end)))
}

async fn read_or_shutdown<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
    shutdown: &GracefulShutdown,
) -> std::io::Result<Option<usize>> {
    tokio::select! {
        n = stream.read(buf) => n.map(Some),
        _ = shutdown.wait_shutting_down() => Ok(None),
    }
}
