use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::utils::http::get_http_client;

const DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const DOWNLOAD_BASE_DELAY_MS: u64 = 400;

/// Sniffs the MIME type from magic bytes. Telegram strips most metadata
/// from photos, so the bytes are the only reliable signal.
pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Fetches a file with bounded retries on transient failures. `None` means
/// the download is not worth retrying further.
pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let client = get_http_client();

    for attempt in 1..=DOWNLOAD_MAX_ATTEMPTS {
        let last = attempt == DOWNLOAD_MAX_ATTEMPTS;

        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.bytes().await {
                    Ok(bytes) => return Some(bytes.to_vec()),
                    Err(err) => {
                        warn!(
                            "Failed to read media bytes from {url}: {err} (attempt {attempt}/{DOWNLOAD_MAX_ATTEMPTS})"
                        );
                        if last {
                            return None;
                        }
                    }
                }
            }
            Ok(response) => {
                let status = response.status();
                warn!(
                    "Media download for {url} returned status {status} (attempt {attempt}/{DOWNLOAD_MAX_ATTEMPTS})"
                );
                if !transient_status(status) || last {
                    return None;
                }
            }
            Err(err) => {
                warn!(
                    "Failed to fetch media from {url}: {err} (attempt {attempt}/{DOWNLOAD_MAX_ATTEMPTS})"
                );
                if !transient_error(&err) || last {
                    return None;
                }
            }
        }

        let delay = Duration::from_millis(DOWNLOAD_BASE_DELAY_MS << (attempt - 1));
        tokio::time::sleep(delay).await;
    }

    None
}
