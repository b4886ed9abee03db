//! Structured sign-in message (EIP-4361 layout).
//!
//! ```text
//! example.com wants you to sign in with your Ethereum account:
//! 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed
//!
//! Sign in to manage your memberships.
//!
//! URI: https://example.com/login
//! Version: 1
//! Chain ID: 1
//! Nonce: 32891756abcdefgh
//! Issued At: 2024-01-01T00:00:00Z
//! Expiration Time: 2024-01-01T00:10:00Z
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use lockgate_core::Address;

use crate::challenge::is_valid_nonce;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("missing header line")]
    MissingHeader,
    #[error("invalid domain")]
    InvalidDomain,
    #[error("invalid address line: {0}")]
    InvalidAddress(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("duplicate field '{0}'")]
    DuplicateField(&'static str),
    #[error("invalid value for '{0}'")]
    InvalidField(&'static str),
    #[error("unexpected line: {0}")]
    UnexpectedLine(String),
}

/// A parsed sign-in message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: Option<String>,
    pub version: Option<String>,
    pub chain_id: Option<u64>,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

#[derive(Default)]
struct Fields {
    uri: Option<String>,
    version: Option<String>,
    chain_id: Option<u64>,
    nonce: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    expiration_time: Option<DateTime<Utc>>,
    not_before: Option<DateTime<Utc>>,
    request_id: Option<String>,
}

fn set_once<T>(slot: &mut Option<T>, name: &'static str, value: T) -> Result<(), MessageError> {
    if slot.is_some() {
        return Err(MessageError::DuplicateField(name));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_time(name: &'static str, value: &str) -> Result<DateTime<Utc>, MessageError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| MessageError::InvalidField(name))
}

impl SignInMessage {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let mut lines = text.lines();

        let header = lines.next().ok_or(MessageError::MissingHeader)?;
        let domain = header
            .strip_suffix(HEADER_SUFFIX)
            .ok_or(MessageError::MissingHeader)?;
        if domain.is_empty() || domain.chars().any(char::is_whitespace) {
            return Err(MessageError::InvalidDomain);
        }

        let address_line = lines.next().ok_or(MessageError::MissingField("address"))?;
        let address: Address = address_line
            .trim()
            .parse()
            .map_err(|_| MessageError::InvalidAddress(address_line.to_string()))?;

        let mut statement = None;
        let mut fields = Fields::default();
        let mut seen_field = false;
        let mut in_resources = false;
        let mut resources = Vec::new();

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            if in_resources {
                match line.strip_prefix("- ") {
                    Some(resource) => {
                        resources.push(resource.to_string());
                        continue;
                    }
                    None => in_resources = false,
                }
            }

            if let Some(v) = line.strip_prefix("URI: ") {
                set_once(&mut fields.uri, "uri", v.to_string())?;
            } else if let Some(v) = line.strip_prefix("Version: ") {
                set_once(&mut fields.version, "version", v.to_string())?;
            } else if let Some(v) = line.strip_prefix("Chain ID: ") {
                let id = v.trim().parse().map_err(|_| MessageError::InvalidField("chainId"))?;
                set_once(&mut fields.chain_id, "chainId", id)?;
            } else if let Some(v) = line.strip_prefix("Nonce: ") {
                if !is_valid_nonce(v) {
                    return Err(MessageError::InvalidField("nonce"));
                }
                set_once(&mut fields.nonce, "nonce", v.to_string())?;
            } else if let Some(v) = line.strip_prefix("Issued At: ") {
                set_once(&mut fields.issued_at, "issuedAt", parse_time("issuedAt", v)?)?;
            } else if let Some(v) = line.strip_prefix("Expiration Time: ") {
                let t = parse_time("expirationTime", v)?;
                set_once(&mut fields.expiration_time, "expirationTime", t)?;
            } else if let Some(v) = line.strip_prefix("Not Before: ") {
                set_once(&mut fields.not_before, "notBefore", parse_time("notBefore", v)?)?;
            } else if let Some(v) = line.strip_prefix("Request ID: ") {
                set_once(&mut fields.request_id, "requestId", v.to_string())?;
            } else if line == "Resources:" {
                in_resources = true;
            } else if !seen_field && statement.is_none() {
                statement = Some(line.to_string());
                continue;
            } else {
                return Err(MessageError::UnexpectedLine(line.to_string()));
            }
            seen_field = true;
        }

        Ok(Self {
            domain: domain.to_string(),
            address,
            statement,
            uri: fields.uri,
            version: fields.version,
            chain_id: fields.chain_id,
            nonce: fields.nonce.ok_or(MessageError::MissingField("nonce"))?,
            issued_at: fields.issued_at.ok_or(MessageError::MissingField("issuedAt"))?,
            expiration_time: fields
                .expiration_time
                .ok_or(MessageError::MissingField("expirationTime"))?,
            not_before: fields.not_before,
            request_id: fields.request_id,
            resources,
        })
    }

    /// Render the canonical text a wallet signs.
    pub fn to_text(&self) -> String {
        let ts = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut out = format!("{}{}\n{}\n", self.domain, HEADER_SUFFIX, self.address.to_checksum());
        if let Some(statement) = &self.statement {
            out.push_str(&format!("\n{statement}\n"));
        }
        out.push('\n');
        if let Some(uri) = &self.uri {
            out.push_str(&format!("URI: {uri}\n"));
        }
        if let Some(version) = &self.version {
            out.push_str(&format!("Version: {version}\n"));
        }
        if let Some(chain_id) = self.chain_id {
            out.push_str(&format!("Chain ID: {chain_id}\n"));
        }
        out.push_str(&format!("Nonce: {}\n", self.nonce));
        out.push_str(&format!("Issued At: {}\n", ts(&self.issued_at)));
        out.push_str(&format!("Expiration Time: {}", ts(&self.expiration_time)));
        if let Some(nb) = &self.not_before {
            out.push_str(&format!("\nNot Before: {}", ts(nb)));
        }
        if let Some(request_id) = &self.request_id {
            out.push_str(&format!("\nRequest ID: {request_id}"));
        }
        if !self.resources.is_empty() {
            out.push_str("\nResources:");
            for r in &self.resources {
                out.push_str(&format!("\n- {r}"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "example.com wants you to sign in with your Ethereum account:
0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed

Sign in to manage your memberships.

URI: https://example.com/login
Version: 1
Chain ID: 1
Nonce: 32891756abcdefgh
Issued At: 2024-01-01T00:00:00Z
Expiration Time: 2024-01-01T00:10:00Z
Resources:
- https://example.com/terms
- ipfs://bafybeiemxf5abjwjbikoz4mc3a3dla6ual3jsgpdr4cjr3oz3evfyavhwq";

    #[test]
    fn parses_full_message() {
        let msg = SignInMessage::parse(SAMPLE).unwrap();
        assert_eq!(msg.domain, "example.com");
        assert_eq!(msg.address.to_checksum(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(msg.statement.as_deref(), Some("Sign in to manage your memberships."));
        assert_eq!(msg.chain_id, Some(1));
        assert_eq!(msg.nonce, "32891756abcdefgh");
        assert_eq!(msg.expiration_time - msg.issued_at, chrono::Duration::minutes(10));
        assert_eq!(msg.resources.len(), 2);
    }

    #[test]
    fn render_then_parse_is_stable() {
        let msg = SignInMessage::parse(SAMPLE).unwrap();
        let text = msg.to_text();
        assert_eq!(SignInMessage::parse(&text).unwrap(), msg);
        assert_eq!(text, SAMPLE);
    }

    #[test]
    fn expiration_time_is_required() {
        let without = SAMPLE.replace("Expiration Time: 2024-01-01T00:10:00Z\n", "");
        assert_eq!(
            SignInMessage::parse(&without),
            Err(MessageError::MissingField("expirationTime"))
        );
    }

    #[test]
    fn nonce_is_required_and_validated() {
        let without = SAMPLE.replace("Nonce: 32891756abcdefgh\n", "");
        assert_eq!(SignInMessage::parse(&without), Err(MessageError::MissingField("nonce")));

        let short = SAMPLE.replace("32891756abcdefgh", "abc");
        assert_eq!(SignInMessage::parse(&short), Err(MessageError::InvalidField("nonce")));
    }

    #[test]
    fn header_must_match() {
        let bad = SAMPLE.replace("wants you to sign in", "would like you to sign in");
        assert_eq!(SignInMessage::parse(&bad), Err(MessageError::MissingHeader));
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let dup = SAMPLE.replace("Version: 1\n", "Version: 1\nVersion: 1\n");
        assert_eq!(SignInMessage::parse(&dup), Err(MessageError::DuplicateField("version")));
    }

    #[test]
    fn stray_lines_after_fields_are_rejected() {
        let stray = SAMPLE.replace("Version: 1\n", "Version: 1\nsomething else\n");
        assert!(matches!(
            SignInMessage::parse(&stray),
            Err(MessageError::UnexpectedLine(_))
        ));
    }
}
