//! Shared cache for the `Date` response header value.
//!
//! Formatting an RFC 1123 date on every response is wasted work when thousands
//! of responses go out per second. The current value is kept behind an
//! [`ArcSwap`] and recomputed at most once per wall-clock second, on access.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;

struct CachedDate {
    epoch_secs: u64,
    value: Bytes,
}

static CURRENT: Lazy<ArcSwap<CachedDate>> = Lazy::new(|| ArcSwap::from_pointee(format_now(now_secs())));

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn format_now(epoch_secs: u64) -> CachedDate {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    CachedDate { epoch_secs, value: Bytes::from_owner(buf) }
}

/// Returns the current `Date` header value, e.g. `Tue, 01 Jul 2025 10:00:00 GMT`.
///
/// Cheap to call from any thread; racing refreshes at a second boundary are
/// harmless since both produce the same formatted value.
pub fn http_date() -> Bytes {
    let now = now_secs();
    let cached = CURRENT.load();
    if cached.epoch_secs == now {
        return cached.value.clone();
    }
    let fresh = format_now(now);
    let value = fresh.value.clone();
    CURRENT.store(Arc::new(fresh));
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_like_an_http_date() {
        let date = http_date();
        let text = std::str::from_utf8(&date).unwrap();
        assert!(text.ends_with("GMT"), "got {text:?}");
        // `Tue, 01 Jul 2025 10:00:00 GMT` is 29 bytes
        assert_eq!(text.len(), 29);
    }

    #[test]
    fn stable_within_the_same_second() {
        let started = now_secs();
        let a = http_date();
        let b = http_date();
        if now_secs() == started {
            assert_eq!(a, b);
        }
    }
}
