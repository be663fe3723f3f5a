//! Utility functions: tracing setup and inbound mail parsing.

use mailparse::{MailHeaderMap, ParsedMail, parse_mail};
use std::collections::HashMap;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize pretty CLI logging.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .pretty()
    .init();
}

/// Everything the ingestion path needs out of a raw RFC 5322 message.
pub struct ParsedMessage {
  pub subject: Option<String>,
  pub from: Option<String>,
  pub text: Option<String>,
  pub html: Option<String>,
  pub headers: HashMap<String, String>,
  pub attachments: Vec<(Option<String>, String, Vec<u8>)>,
  pub size_bytes: i64,
}

/// Parse a raw message into the pieces stored per inbox.
pub fn parse_inbound(raw: &[u8]) -> Result<ParsedMessage, mailparse::MailParseError> {
  let parsed = parse_mail(raw)?;

  let mut headers = HashMap::new();
  for h in &parsed.headers {
    headers.insert(h.get_key().to_ascii_lowercase(), h.get_value());
  }

  let mut msg = ParsedMessage {
    subject: headers.get("subject").cloned(),
    from: headers.get("from").cloned(),
    text: None,
    html: None,
    headers,
    attachments: Vec::new(),
    size_bytes: raw.len() as i64,
  };
  walk_parts(&parsed, &mut msg);
  Ok(msg)
}

/// Depth-first walk of the MIME tree, keeping the first text and HTML
/// bodies and every part that looks like an attachment.
fn walk_parts(part: &ParsedMail<'_>, msg: &mut ParsedMessage) {
  if !part.subparts.is_empty() {
    for sub in &part.subparts {
      walk_parts(sub, msg);
    }
    return;
  }

  let ctype = part.ctype.mimetype.as_str();
  let disposition = part
    .headers
    .get_first_value("Content-Disposition")
    .unwrap_or_default();
  let filename = attachment_filename(part, &disposition);

  let is_body_candidate = ctype == "text/plain" || ctype == "text/html";
  let is_attachment =
    disposition.to_ascii_lowercase().contains("attachment") || filename.is_some() || !is_body_candidate;

  if is_attachment {
    let data = part.get_body_raw().unwrap_or_default();
    msg.attachments.push((filename, part.ctype.mimetype.clone(), data));
    return;
  }

  let data = part.get_body().unwrap_or_default();
  if ctype == "text/html" {
    if msg.html.is_none() {
      msg.html = Some(data);
    }
  } else if msg.text.is_none() {
    msg.text = Some(data);
  }
}

/// Filename from Content-Disposition, falling back to the content-type
/// `name` parameter.
fn attachment_filename(part: &ParsedMail<'_>, disposition: &str) -> Option<String> {
  if let Some(pos) = disposition.to_lowercase().find("filename=") {
    let rest = &disposition[pos + 9..];
    let cleaned = rest
      .trim()
      .trim_matches(['"', '\''])
      .split(';')
      .next()
      .unwrap_or("");
    if !cleaned.is_empty() {
      return Some(cleaned.to_string());
    }
  }
  part
    .ctype
    .params
    .iter()
    .find(|(k, _)| k.eq_ignore_ascii_case("name"))
    .map(|(_, v)| v.clone())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_plain_message() {
    let eml = b"From: a@example.test\r\nSubject: Hi\r\n\r\nhello";
    let msg = parse_inbound(eml).unwrap();
    assert_eq!(msg.subject.as_deref(), Some("Hi"));
    assert_eq!(msg.from.as_deref(), Some("a@example.test"));
    assert_eq!(msg.text.as_deref(), Some("hello"));
    assert!(msg.html.is_none());
    assert!(msg.attachments.is_empty());
    assert_eq!(msg.size_bytes, eml.len() as i64);
  }

  #[test]
  fn splits_multipart_bodies_and_attachments() {
    let eml = concat!(
      "From: a@example.test\r\n",
      "Subject: Mixed\r\n",
      "MIME-Version: 1.0\r\n",
      "Content-Type: multipart/mixed; boundary=BOUND\r\n",
      "\r\n",
      "--BOUND\r\n",
      "Content-Type: text/plain\r\n\r\n",
      "plain part\r\n",
      "--BOUND\r\n",
      "Content-Type: text/html\r\n\r\n",
      "<b>html part</b>\r\n",
      "--BOUND\r\n",
      "Content-Type: application/octet-stream\r\n",
      "Content-Disposition: attachment; filename=\"a.bin\"\r\n\r\n",
      "DATA\r\n",
      "--BOUND--\r\n",
    );
    let msg = parse_inbound(eml.as_bytes()).unwrap();
    assert!(msg.text.as_deref().unwrap().contains("plain part"));
    assert!(msg.html.as_deref().unwrap().contains("<b>html part</b>"));
    assert_eq!(msg.attachments.len(), 1);
    let (name, ctype, _) = &msg.attachments[0];
    assert_eq!(name.as_deref(), Some("a.bin"));
    assert_eq!(ctype, "application/octet-stream");
  }

  #[test]
  fn headers_are_lowercased() {
    let eml = b"X-Custom-Header: abc\r\nSubject: s\r\n\r\nbody";
    let msg = parse_inbound(eml).unwrap();
    assert_eq!(msg.headers.get("x-custom-header").map(String::as_str), Some("abc"));
  }
}
