//! HTTP retrieval of remote `.torrent` payloads.

use crate::error::{Error, Result};

/// Some trackers refuse requests without a browser-looking User-Agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/74.0.3729.169 Safari/537.36";

/// Per-request ceiling; a slow upstream aborts the conversation instead of
/// hanging the submission task.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Refuse absurdly large payloads — a `.torrent` metadata file is small.
const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the client used for payload fetches.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .expect("failed to build reqwest client")
}

/// Fetch a `.torrent` payload from a URL the user supplied.
pub async fn fetch_torrent_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::UpstreamStatus(status.as_u16()));
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(Error::UpstreamStatus(413));
    }
    Ok(bytes.to_vec())
}
