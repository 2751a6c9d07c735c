use url::{ParseError, Url};

use crate::{
    FetchError,
    fetch::{ContextEnd, FetchContext, Shared, Transport, UrlResult},
};

/// Fetches `urls[idx]` and either fills its result slot or escalates the first failure.
///
/// Returns silently when the operation was already cancelled by another task or by the
/// caller. The transport future is owned here and dropped before returning, so no request
/// outlives the task.
pub(crate) async fn fetch_one<T: Transport>(
    shared: &Shared,
    transport: &T,
    parent: &FetchContext,
    idx: usize,
) {
    let url = &shared.urls[idx];
    if shared.signal.is_fired() {
        return;
    }

    let target = match parse_target(url) {
        Ok(target) => target,
        Err(err) => return escalate(shared, err),
    };

    let ctx = parent.child().with_timeout(shared.fetch_timeout);

    let outcome = tokio::select! {
        biased;
        _ = shared.signal.fired() => {
            log::trace!("url[{idx}] dropped, operation already failed");
            return;
        }
        end = ctx.done() => match end {
            ContextEnd::Cancelled => {
                log::debug!("url[{idx}] cancelled by caller");
                return;
            }
            ContextEnd::DeadlineExceeded => Err(FetchError::timeout(url.as_str())),
        },
        res = transport.get(target) => {
            res.map_err(|e| FetchError::unprocessable(url.as_str(), e))
        }
    };

    match outcome {
        Ok(body) => {
            log::debug!("url[{idx}] fetched {} bytes", body.len());
            shared.results.write(
                idx,
                UrlResult {
                    url: url.clone(),
                    result: body,
                },
            );
        }
        Err(err) => escalate(shared, err),
    }
}

fn escalate(shared: &Shared, err: FetchError) {
    // someone else already failed the operation; their error stands
    if shared.signal.is_fired() {
        log::debug!("discarding late failure: {err}");
        return;
    }
    if shared.captured.try_capture(err.clone()) {
        log::warn!("fan-out aborted: {err}");
    } else {
        log::debug!("discarding late failure: {err}");
    }
    shared.signal.fire();
}

/// Strings that are not URLs at all are `BadUrl`. Strings that parse but cannot be
/// requested (relative references, non-http schemes) fail like a transport error.
pub(crate) fn parse_target(raw: &str) -> Result<Url, FetchError> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => Err(FetchError::unprocessable(
            raw,
            format!("unsupported protocol scheme \"{}\"", url.scheme()),
        )),
        Err(ParseError::RelativeUrlWithoutBase) => Err(FetchError::unprocessable(
            raw,
            "unsupported protocol scheme \"\"",
        )),
        // well-formed but unreachable: an empty host or a port out of range
        Err(e @ ParseError::EmptyHost) => Err(FetchError::unprocessable(raw, e)),
        Err(e @ ParseError::InvalidPort) if has_numeric_port(raw) => {
            Err(FetchError::unprocessable(raw, e))
        }
        Err(e) => Err(FetchError::bad_url(raw, e)),
    }
}

fn has_numeric_port(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    match host_port.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
