//! Bot-detection heuristic for inbox creation requests.
//!
//! Pure function of the request metadata; no I/O. Burst and sustained-rate
//! abuse is handled separately by `ratelimit`, not here.

use serde::Serialize;

/// Substrings that mark automation tooling in a lower-cased user agent.
const BOT_INDICATORS: &[&str] = &[
  "bot",
  "crawl",
  "spider",
  "scrape",
  "curl",
  "wget",
  "python",
  "requests",
  "urllib",
  "httpclient",
  "go-http",
  "java/",
  "headless",
  "phantomjs",
  "selenium",
  "puppeteer",
  "playwright",
];

/// Substrings found in real browser user agents, including the verbose
/// mobile-vendor ones that also trip generic indicators.
const BROWSER_MARKERS: &[&str] = &[
  "chrome",
  "firefox",
  "safari",
  "edg",
  "opera",
  "samsungbrowser",
  "miuibrowser",
  "mobile",
];

/// Placeholder fingerprints handed out by scripts that never ran the
/// client-side collector.
const FINGERPRINT_DENYLIST: &[&str] = &[
  "unknown_fingerprint",
  "default_fingerprint",
  "test_fingerprint",
  "bot_fingerprint",
  "fake_fingerprint",
  "null",
  "undefined",
];

const MIN_FINGERPRINT_LEN: usize = 8;
const MIN_CREATION_INTERVAL_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
  Critical,
}

/// Outcome of screening one creation request.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
  pub is_bot: bool,
  pub reason: String,
  pub risk_level: RiskLevel,
  pub should_block: bool,
}

impl RiskAssessment {
  fn blocked(reason: &str, risk_level: RiskLevel) -> Self {
    RiskAssessment {
      is_bot: true,
      reason: reason.to_string(),
      risk_level,
      should_block: true,
    }
  }

  fn clean() -> Self {
    RiskAssessment {
      is_bot: false,
      reason: "passed".to_string(),
      risk_level: RiskLevel::Low,
      should_block: false,
    }
  }
}

/// Classify a creation request. Rules run in order; first match wins.
pub fn evaluate(
  user_agent: &str,
  creation_interval_seconds: Option<f64>,
  fingerprint: &str,
) -> RiskAssessment {
  if is_bot_user_agent(user_agent) {
    return RiskAssessment::blocked("automated user agent", RiskLevel::High);
  }

  if let Some(interval) = creation_interval_seconds {
    if interval < MIN_CREATION_INTERVAL_SECS {
      return RiskAssessment::blocked("rapid repeat creation", RiskLevel::Medium);
    }
  }

  if !is_plausible_fingerprint(fingerprint) {
    return RiskAssessment::blocked("invalid fingerprint", RiskLevel::Medium);
  }

  RiskAssessment::clean()
}

/// A UA with no browser marker is bot-like on a single indicator hit.
/// With a browser marker present we require two hits, since vendor UAs
/// are verbose enough to graze one by accident.
fn is_bot_user_agent(user_agent: &str) -> bool {
  let ua = user_agent.to_lowercase();
  let hits = BOT_INDICATORS.iter().filter(|m| ua.contains(*m)).count();
  let looks_like_browser = BROWSER_MARKERS.iter().any(|m| ua.contains(m));
  if looks_like_browser {
    hits >= 2
  } else {
    hits >= 1
  }
}

fn is_plausible_fingerprint(fingerprint: &str) -> bool {
  if fingerprint.len() < MIN_FINGERPRINT_LEN {
    return false;
  }
  let fp = fingerprint.to_lowercase();
  !FINGERPRINT_DENYLIST.iter().any(|m| fp.contains(m))
}

#[cfg(test)]
mod tests {
  use super::*;

  const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

  #[test]
  fn plain_script_ua_blocks_regardless_of_other_inputs() {
    let a = evaluate("python-requests/2.28", Some(3600.0), "a1b2c3d4e5f6");
    assert!(a.should_block);
    assert!(a.is_bot);
    assert_eq!(a.risk_level, RiskLevel::High);
  }

  #[test]
  fn curl_blocks_without_browser_marker() {
    let a = evaluate("curl/8.4.0", None, "a1b2c3d4e5f6");
    assert!(a.should_block);
    assert_eq!(a.risk_level, RiskLevel::High);
  }

  #[test]
  fn browser_ua_with_single_graze_passes() {
    // "Mobile Safari" carries a browser marker; one indicator hit is not
    // enough to block it.
    let ua = "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 (KHTML, like Gecko) \
       Chrome/120.0 Mobile Safari/537.36 spiderweb-theme";
    let a = evaluate(ua, None, "a1b2c3d4e5f6");
    assert!(!a.should_block);
  }

  #[test]
  fn browser_ua_with_two_indicators_blocks() {
    let ua = "Mozilla/5.0 Chrome/120.0 Safari/537.36 selenium puppeteer";
    let a = evaluate(ua, None, "a1b2c3d4e5f6");
    assert!(a.should_block);
    assert_eq!(a.risk_level, RiskLevel::High);
  }

  #[test]
  fn interval_below_two_seconds_blocks_medium() {
    let a = evaluate(CHROME_UA, Some(1.9), "a1b2c3d4e5f6");
    assert!(a.should_block);
    assert_eq!(a.risk_level, RiskLevel::Medium);
  }

  #[test]
  fn interval_of_exactly_two_seconds_passes() {
    let a = evaluate(CHROME_UA, Some(2.0), "a1b2c3d4e5f6");
    assert!(!a.should_block);
  }

  #[test]
  fn missing_interval_passes() {
    let a = evaluate(CHROME_UA, None, "a1b2c3d4e5f6");
    assert!(!a.should_block);
  }

  #[test]
  fn short_fingerprint_blocks() {
    let a = evaluate(CHROME_UA, None, "a1b2c3d");
    assert!(a.should_block);
    assert_eq!(a.risk_level, RiskLevel::Medium);
  }

  #[test]
  fn eight_char_random_fingerprint_passes() {
    let a = evaluate(CHROME_UA, None, "k9x2m4q7");
    assert!(!a.should_block);
  }

  #[test]
  fn placeholder_fingerprint_blocks_case_insensitively() {
    for fp in ["Test_Fingerprint_123", "xxNULLxxyy", "UNDEFINED-abc"] {
      let a = evaluate(CHROME_UA, None, fp);
      assert!(a.should_block, "expected block for {fp}");
    }
  }

  #[test]
  fn ua_rule_dominates_fingerprint_rule() {
    let a = evaluate("scrapy-bot/1.0", Some(0.1), "null");
    assert_eq!(a.risk_level, RiskLevel::High);
    assert_eq!(a.reason, "automated user agent");
  }

  #[test]
  fn clean_request_is_low_risk() {
    let a = evaluate(CHROME_UA, Some(120.0), "f8d9a7b6c5e4d3a2");
    assert!(!a.is_bot);
    assert!(!a.should_block);
    assert_eq!(a.risk_level, RiskLevel::Low);
  }
}
