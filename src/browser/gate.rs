//! Initial navigation to the portal before any code is looked up.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{BrowserError, DriverEvent, PageDriver};

/// How the first page load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageReadiness {
    Loaded,
    /// No load event arrived in time; the page may still be usable.
    TimedOut,
}

/// Navigate to `url` and wait for the first page-load event.
///
/// A reported failure is an error. Silence until `timeout` only yields
/// [`PageReadiness::TimedOut`], since slow portals still often accept input.
pub async fn open_target<D>(
    driver: &mut D,
    url: &str,
    timeout: Duration,
) -> Result<PageReadiness, BrowserError>
where
    D: PageDriver + ?Sized,
{
    info!("Loading {}", url);
    driver.load(url).await?;

    let wait = async {
        loop {
            match driver.next_event().await {
                Some(DriverEvent::PageLoad { ok: true, .. }) => return Ok(()),
                Some(DriverEvent::PageLoad { ok: false, url: failed }) => {
                    return Err(BrowserError::Navigation {
                        url: failed.unwrap_or_else(|| url.to_string()),
                        message: "page reported a load failure".to_string(),
                    })
                }
                Some(other) => debug!("Ignoring event before first load: {:?}", other),
                None => {
                    return Err(BrowserError::Navigation {
                        url: url.to_string(),
                        message: "browser closed while loading".to_string(),
                    })
                }
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(())) => {
            info!("Page ready");
            Ok(PageReadiness::Loaded)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(
                "No load event from {} after {:?}; continuing anyway",
                url, timeout
            );
            Ok(PageReadiness::TimedOut)
        }
    }
}
