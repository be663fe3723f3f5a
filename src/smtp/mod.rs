//! Inbound SMTP listener.
//!
//! Supports HELO/EHLO, MAIL FROM, RCPT TO, DATA, RSET, NOOP, QUIT. Each
//! RCPT TO runs the admission gate and answers with its SMTP code, so
//! invalid, unknown, and expired mailboxes bounce at the envelope stage
//! and transient store trouble asks the peer to retry instead.

use chrono::Utc;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    admission::{self, Decision},
    app::AppState,
    ingest, metrics,
    util::parse_inbound,
};

pub async fn start_smtp(state: AppState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = std::env::var("WISPMAIL_SMTP_ADDR").unwrap_or_else(|_| "127.0.0.1:2525".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("smtp listener: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(state, stream).await {
                warn!("smtp connection error from {}: {}", peer, e);
            }
        });
    }
}

async fn handle_client(
    state: AppState,
    stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    writer.write_all(b"220 wispmail smtp\r\n").await?;
    writer.flush().await?;

    let mut mail_from: Option<String> = None;
    // Recipients that passed admission, with their inbox ids.
    let mut accepted: Vec<(String, Uuid)> = Vec::new();
    let mut buf = String::new();

    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).await?;
        if n == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\r', '\n']);
        debug!("smtp <= {}", line);
        let upper = line.to_uppercase();

        if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            writer.write_all(b"250 wispmail\r\n").await?;
        } else if upper.starts_with("MAIL FROM:") {
            mail_from = Some(line[10..].trim().trim_matches(['<', '>']).to_string());
            accepted.clear();
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper.starts_with("RCPT TO:") {
            let recipient = line[8..].trim().trim_matches(['<', '>']).to_lowercase();
            let decision = admission::admit(&state.db, &state.domain, &recipient, Utc::now()).await;
            record_admission(&state, &decision).await;
            match decision {
                Decision::Accept { inbox_id } => {
                    accepted.push((recipient, inbox_id));
                    writer.write_all(b"250 Accepted\r\n").await?;
                }
                Decision::Reject { reason } => {
                    writer
                        .write_all(format!("550 {}\r\n", reason).as_bytes())
                        .await?;
                }
                Decision::TempFail { reason } => {
                    writer
                        .write_all(format!("451 {}\r\n", reason).as_bytes())
                        .await?;
                }
            }
        } else if upper == "DATA" {
            if accepted.is_empty() {
                writer.write_all(b"554 No valid recipients\r\n").await?;
                continue;
            }
            writer
                .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                .await?;
            let mut data = Vec::new();
            // Read until line with single '.'
            loop {
                let mut line = String::new();
                let n = reader.read_line(&mut line).await?;
                if n == 0 {
                    break;
                }
                if line == ".\r\n" || line == ".\n" {
                    break;
                }
                data.extend_from_slice(line.as_bytes());
            }

            match store_for_recipients(&state, mail_from.clone(), &accepted, &data).await {
                Ok(first_id) => {
                    writer
                        .write_all(format!("250 OK id={}\r\n", first_id).as_bytes())
                        .await?;
                }
                Err(e) => {
                    error!("smtp store error: {e}");
                    writer
                        .write_all(b"451 Requested action aborted: local error\r\n")
                        .await?;
                }
            }
            accepted.clear();
        } else if upper == "RSET" {
            mail_from = None;
            accepted.clear();
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper == "NOOP" {
            writer.write_all(b"250 OK\r\n").await?;
        } else if upper == "QUIT" {
            writer.write_all(b"221 Bye\r\n").await?;
            break;
        } else {
            writer.write_all(b"502 Command not implemented\r\n").await?;
        }
    }
    Ok(())
}

/// Parse once, store one copy per accepted recipient inbox.
async fn store_for_recipients(
    state: &AppState,
    envelope_from: Option<String>,
    accepted: &[(String, Uuid)],
    raw: &[u8],
) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
    let parsed = parse_inbound(raw).map_err(|e| {
        error!("smtp parse error: {e}");
        Box::<dyn std::error::Error + Send + Sync>::from("parse error")
    })?;
    let sender = parsed.from.clone().or(envelope_from);

    let mut first_id = None;
    for (recipient, inbox_id) in accepted {
        let id = ingest::store_message(
            state,
            ingest::NewEmail {
                inbox_id: *inbox_id,
                sender: sender.clone(),
                recipient: recipient.clone(),
                subject: parsed.subject.clone(),
                body: parsed.text.clone(),
                html_body: parsed.html.clone(),
                headers: parsed.headers.clone(),
                received_at: Utc::now(),
                size_bytes: parsed.size_bytes,
                attachments: parsed.attachments.clone(),
            },
        )
        .await?;
        first_id.get_or_insert(id);
    }
    Ok(first_id.unwrap_or_else(Uuid::new_v4))
}

async fn record_admission(state: &AppState, decision: &Decision) {
    if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_ADMISSION_CHECKS, 1).await {
        error!("admission metric failed: {e}");
    }
    if matches!(decision, Decision::Reject { .. }) {
        if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_ADMISSION_REJECTED, 1).await {
            error!("admission metric failed: {e}");
        }
    }
}
