//! URL reachability checks applied before loading an audio source.

use log::debug;

/// Injected predicate deciding whether a URL is worth handing to a
/// provider.
pub type UrlValidator = Box<dyn Fn(&str) -> bool + Send>;

/// Local files are always accepted without a network check; http(s)
/// sources are probed with a HEAD request.
pub fn is_playable_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        let reachable = ureq::head(url).call().is_ok();
        debug!("Reachability check for {}: {}", url, reachable);
        return reachable;
    }
    true
}
