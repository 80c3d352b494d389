// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in message format (EIP-4361).
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expiration_time}
//! ```
//!
//! The statement and expiration lines are optional. Parsing is exact: the
//! message is re-read from the bytes the wallet signed, so whatever the
//! verifier checks is what the signature covers.

use std::str::FromStr;

use alloy::primitives::Address;
use chrono::{DateTime, SecondsFormat, Utc};

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const VERSION: &str = "1";

/// A structured sign-in message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("message header is missing or malformed")]
    MissingHeader,

    #[error("invalid address line: {0}")]
    InvalidAddress(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("unsupported message version: {0}")]
    UnsupportedVersion(String),
}

impl std::fmt::Display for SignInMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}\n{}\n\n", self.domain, HEADER_SUFFIX, self.address)?;
        if let Some(statement) = &self.statement {
            write!(f, "{statement}\n\n")?;
        }
        write!(
            f,
            "URI: {}\nVersion: {}\nChain ID: {}\nNonce: {}\nIssued At: {}",
            self.uri,
            VERSION,
            self.chain_id,
            self.nonce,
            format_time(&self.issued_at)
        )?;
        if let Some(expiration) = &self.expiration_time {
            write!(f, "\nExpiration Time: {}", format_time(expiration))?;
        }
        Ok(())
    }
}

impl FromStr for SignInMessage {
    type Err = MessageError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let mut lines = message.lines();

        let domain = lines
            .next()
            .and_then(|line| line.strip_suffix(HEADER_SUFFIX))
            .filter(|domain| !domain.is_empty())
            .ok_or(MessageError::MissingHeader)?
            .to_string();

        let address_line = lines.next().ok_or(MessageError::MissingField("address"))?;
        let address = Address::from_str(address_line.trim())
            .map_err(|_| MessageError::InvalidAddress(address_line.to_string()))?;

        if lines.next() != Some("") {
            return Err(MessageError::MissingField("blank line after address"));
        }

        let mut statement = None;
        let mut next = lines.next();
        if let Some(line) = next {
            if !line.starts_with("URI: ") {
                statement = Some(line.to_string());
                if lines.next() != Some("") {
                    return Err(MessageError::MissingField("blank line after statement"));
                }
                next = lines.next();
            }
        }

        let uri = field(next, "URI")?.to_string();

        let version = field(lines.next(), "Version")?;
        if version != VERSION {
            return Err(MessageError::UnsupportedVersion(version.to_string()));
        }

        let chain_raw = field(lines.next(), "Chain ID")?;
        let chain_id = chain_raw.parse().map_err(|_| MessageError::InvalidField {
            field: "Chain ID",
            value: chain_raw.to_string(),
        })?;

        let nonce = field(lines.next(), "Nonce")?;
        if nonce.len() < 8 || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MessageError::InvalidField {
                field: "Nonce",
                value: nonce.to_string(),
            });
        }
        let nonce = nonce.to_string();

        let issued_at = parse_time("Issued At", field(lines.next(), "Issued At")?)?;

        let expiration_time = match lines.next() {
            Some(line) => Some(parse_time(
                "Expiration Time",
                field(Some(line), "Expiration Time")?,
            )?),
            None => None,
        };

        Ok(SignInMessage {
            domain,
            address,
            statement,
            uri,
            chain_id,
            nonce,
            issued_at,
            expiration_time,
        })
    }
}

fn field<'a>(line: Option<&'a str>, name: &'static str) -> Result<&'a str, MessageError> {
    line.and_then(|l| l.strip_prefix(name))
        .and_then(|rest| rest.strip_prefix(": "))
        .ok_or(MessageError::MissingField(name))
}

fn parse_time(name: &'static str, value: &str) -> Result<DateTime<Utc>, MessageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| MessageError::InvalidField {
            field: name,
            value: value.to_string(),
        })
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> SignInMessage {
        SignInMessage {
            domain: "vpn.example.org".to_string(),
            address: Address::repeat_byte(0xab),
            statement: Some("Sign in to the tunnel gateway.".to_string()),
            uri: "https://vpn.example.org".to_string(),
            chain_id: 137,
            nonce: "a1b2c3d4e5f60718".to_string(),
            issued_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            expiration_time: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap()),
        }
    }

    #[test]
    fn renders_eip4361_layout() {
        let text = sample().to_string();
        let expected = format!(
            "vpn.example.org wants you to sign in with your Ethereum account:\n{}\n\n\
             Sign in to the tunnel gateway.\n\n\
             URI: https://vpn.example.org\nVersion: 1\nChain ID: 137\n\
             Nonce: a1b2c3d4e5f60718\nIssued At: 2026-03-01T12:00:00Z\n\
             Expiration Time: 2026-03-01T12:05:00Z",
            Address::repeat_byte(0xab)
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn parses_rendered_message() {
        let message = sample();
        let parsed: SignInMessage = message.to_string().parse().unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn statement_and_expiration_are_optional() {
        let mut message = sample();
        message.statement = None;
        message.expiration_time = None;
        let parsed: SignInMessage = message.to_string().parse().unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn rejects_missing_header() {
        let text = sample().to_string().replacen("wants you", "would like you", 1);
        assert_eq!(
            text.parse::<SignInMessage>(),
            Err(MessageError::MissingHeader)
        );
    }

    #[test]
    fn rejects_bad_address() {
        let text = sample()
            .to_string()
            .replace(&Address::repeat_byte(0xab).to_string(), "0xnothex");
        assert!(matches!(
            text.parse::<SignInMessage>(),
            Err(MessageError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_short_nonce() {
        let text = sample().to_string().replace("a1b2c3d4e5f60718", "abc");
        assert!(matches!(
            text.parse::<SignInMessage>(),
            Err(MessageError::InvalidField { field: "Nonce", .. })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let text = sample().to_string().replace("Version: 1", "Version: 2");
        assert_eq!(
            text.parse::<SignInMessage>(),
            Err(MessageError::UnsupportedVersion("2".to_string()))
        );
    }
}
