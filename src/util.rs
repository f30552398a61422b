//! Utility functions used by Stampede, and available when writing iterations.

use lazy_static::lazy_static;
use num_format::{Locale, ToFormattedString};
use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use url::Url;

use crate::{StampedeError, CANCELED};

lazy_static! {
    static ref TIMESPAN: Regex =
        Regex::new(r"^(?:(?P<hours>\d+)h)?(?:(?P<minutes>\d+)m)?(?:(?P<seconds>\d+)s)?(?:(?P<millis>\d+)ms)?$")
            .expect("timespan regex is valid");
}

/// Parse a string representing a time span into a [`Duration`].
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", "s" and "ms", in that order, indicating
/// "hours", "minutes", "seconds" and "milliseconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, 500ms, 1s500ms, etc.
/// Anything else returns `None`.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use stampede::util;
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s"), Some(Duration::from_secs(3_723)));
///
/// // A bare integer is seconds.
/// assert_eq!(util::parse_timespan("45"), Some(Duration::from_secs(45)));
///
/// // Invalid values are rejected.
/// assert_eq!(util::parse_timespan("foo"), None);
/// ```
pub fn parse_timespan(time_str: &str) -> Option<Duration> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        return None;
    }

    // If an integer is passed in, assume it's seconds.
    if let Ok(seconds) = u64::from_str(time_str) {
        trace!("{} is integer: {} seconds", time_str, seconds);
        return Some(Duration::from_secs(seconds));
    }

    let captures = TIMESPAN.captures(time_str)?;
    let unit = |name: &str| -> Option<u64> {
        match captures.name(name) {
            Some(m) => u64::from_str(m.as_str()).ok(),
            None => Some(0),
        }
    };
    let hours = unit("hours")?;
    let minutes = unit("minutes")?;
    let seconds = unit("seconds")?;
    let millis = unit("millis")?;

    // Too large to represent is invalid.
    let total_seconds = hours
        .checked_mul(60 * 60)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    let total = Duration::from_secs(total_seconds).checked_add(Duration::from_millis(millis))?;
    trace!(
        "{} hours {} minutes {} seconds {} milliseconds: {:?}",
        hours,
        minutes,
        seconds,
        millis,
        total
    );
    Some(total)
}

/// Helper function to determine if a host can be parsed.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// // Hostname is a valid URL.
/// assert!(util::is_valid_host("http://localhost/").is_ok());
///
/// // IP is a valid URL.
/// assert!(util::is_valid_host("http://127.0.0.1").is_ok());
///
/// // Protocol is required.
/// assert!(util::is_valid_host("example.com/").is_err());
/// ```
pub fn is_valid_host(host: &str) -> Result<Url, StampedeError> {
    let url = Url::parse(host).map_err(|parse_error| StampedeError::InvalidHost {
        host: host.to_string(),
        detail: "Invalid host.".to_string(),
        parse_error,
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(StampedeError::InvalidOption {
            option: "`configuration.host`".to_string(),
            value: host.to_string(),
            detail: "`configuration.host` must include a scheme and a host name.".to_string(),
        });
    }
    Ok(url)
}

/// Calculate the median of a histogram of rounded response times.
///
/// As the values are rounded, the result is clamped between the real `min` and `max`.
///
/// # Example
/// ```rust
/// use std::collections::BTreeMap;
/// use stampede::util;
///
/// let mut btree: BTreeMap<usize, usize> = BTreeMap::new();
/// btree.insert(10, 3);
/// btree.insert(20, 5);
/// btree.insert(90, 2);
///
/// // Median (middle) value in this list of 10 integers is 20.
/// assert_eq!(util::median(&btree, 10, 9, 92), 20);
/// ```
pub fn median(btree: &BTreeMap<usize, usize>, total_elements: usize, min: usize, max: usize) -> usize {
    percentile(btree, total_elements, min, max, 0.5)
}

/// Get the response time that a certain fraction of the requests finished within.
pub fn percentile(
    btree: &BTreeMap<usize, usize>,
    total_elements: usize,
    min: usize,
    max: usize,
    percent: f32,
) -> usize {
    let percentile_element = (total_elements as f32 * percent).round() as usize;
    let mut total_count: usize = 0;
    for (value, counter) in btree {
        total_count += counter;
        if total_count >= percentile_element {
            // We're working with rounded values, it's possible the result is greater
            // than the max response time, or smaller than the min response time.
            return (*value).clamp(min, max.max(min));
        }
    }
    0
}

/// Truncate strings when they're too long to display.
///
/// If a string is longer than the specified max length, this function removes extra
/// the characters and replaces the last two with a double-period ellipsis.
///
/// # Example
/// ```rust
/// use stampede::util;
///
/// assert_eq!(util::truncate_string("this is a long string", 9), "this is..");
/// assert_eq!(util::truncate_string("shorter string", 15), "shorter string");
/// ```
pub fn truncate_string(str_to_truncate: &str, max_length: usize) -> String {
    if str_to_truncate.char_indices().count() > max_length {
        match str_to_truncate.char_indices().nth(max_length.saturating_sub(2)) {
            None => str_to_truncate.to_string(),
            Some((idx, _)) => format!("{}..", &str_to_truncate[..idx]),
        }
    } else {
        str_to_truncate.to_string()
    }
}

/// Format large number in locale appropriate style.
pub fn format_number(number: usize) -> String {
    number.to_formatted_string(&Locale::en)
}

// Internal helper to configure the control-c handler. Shutdown cleanly on the first
// ctrl-c. Exit abruptly on the second ctrl-c.
pub(crate) fn setup_ctrlc_handler() {
    CANCELED.store(false, Ordering::SeqCst);
    match ctrlc::set_handler(move || {
        // We've caught a ctrl-c, determine if it's the first time or an additional time.
        if CANCELED.swap(true, Ordering::SeqCst) {
            warn!("caught another ctrl-c, exiting immediately...");
            std::process::exit(1);
        } else {
            warn!("caught ctrl-c, stopping...");
        }
    }) {
        Ok(_) => (),
        // The handler can only be installed once per process, which is expected when
        // running more than one load test (for example from tests).
        Err(e) => debug!("ctrl-c handler already installed: {}", e),
    }
}

/// Returns `true` once a ctrl-c has been caught during the current load test.
pub(crate) fn canceled() -> bool {
    CANCELED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespan() {
        assert_eq!(parse_timespan("0"), Some(Duration::from_secs(0)));
        assert_eq!(parse_timespan("foo"), None);
        assert_eq!(parse_timespan(""), None);
        assert_eq!(parse_timespan("1"), Some(Duration::from_secs(1)));
        assert_eq!(parse_timespan("1s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_timespan("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_timespan(" 30s "), Some(Duration::from_secs(30)));
        assert_eq!(parse_timespan("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_timespan("61"), Some(Duration::from_secs(61)));
        assert_eq!(parse_timespan("1m1s"), Some(Duration::from_secs(61)));
        assert_eq!(parse_timespan("10m5s"), Some(Duration::from_secs(605)));
        assert_eq!(parse_timespan("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_timespan("1h15s"), Some(Duration::from_secs(3615)));
        assert_eq!(parse_timespan("1h5m13s"), Some(Duration::from_secs(3913)));
        assert_eq!(parse_timespan("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_timespan("1s250ms"), Some(Duration::from_millis(1250)));
        assert_eq!(
            parse_timespan("88h88m88s"),
            Some(Duration::from_secs(322_168))
        );
        // Units must appear in order and be spelled exactly.
        assert_eq!(parse_timespan("5s1m"), None);
        assert_eq!(parse_timespan("5124095576030432h"), None);
        assert_eq!(parse_timespan("307445734561825861m"), None);
        assert_eq!(parse_timespan("18446744073709551616s"), None);
        assert_eq!(
            parse_timespan("18446744073709551615"),
            Some(Duration::from_secs(u64::MAX))
        );
        assert_eq!(parse_timespan("15mins"), None);
        assert_eq!(parse_timespan("-5"), None);
    }

    #[test]
    fn percentiles() {
        let mut btree: BTreeMap<usize, usize> = BTreeMap::new();
        assert_eq!(median(&btree, 0, 0, 0), 0);

        btree.insert(40, 50);
        btree.insert(120, 45);
        btree.insert(1_000, 5);
        assert_eq!(median(&btree, 100, 38, 1_210), 40);
        assert_eq!(percentile(&btree, 100, 38, 1_210, 0.75), 120);
        assert_eq!(percentile(&btree, 100, 38, 1_210, 0.98), 1_000);
        // Rounded values are clamped to the real extremes.
        assert_eq!(percentile(&btree, 100, 42, 900, 0.1), 42);
        assert_eq!(percentile(&btree, 100, 42, 900, 0.9999), 900);
    }

    #[test]
    fn truncate() {
        assert_eq!(
            truncate_string("the quick brown fox", 25),
            "the quick brown fox"
        );
        assert_eq!(truncate_string("the quick brown fox", 10), "the quic..");
        assert_eq!(truncate_string("abcde", 5), "abcde");
        assert_eq!(truncate_string("abcde", 4), "ab..");
        assert_eq!(truncate_string("abcde", 2), "..");
        assert_eq!(truncate_string("これはテストだ", 3), "こ..");
    }

    #[test]
    fn number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn valid_host() {
        assert!(is_valid_host("http://example.com").is_ok());
        assert!(is_valid_host("example.com").is_err());
        assert!(is_valid_host("http://example.com/").is_ok());
        assert!(is_valid_host("https://www.example.com/and/with/path").is_ok());
        assert!(is_valid_host("www.example.com/and/with/path").is_err());
        assert!(is_valid_host("/path/to/file").is_err());
        assert!(is_valid_host("http://").is_err());
        assert!(is_valid_host("http://foo").is_ok());
        assert!(is_valid_host("http:// example.com").is_err());
        assert!(is_valid_host("mailto:someone@example.com").is_err());
    }
}
