//! AWS Signature Version 4 for JSON-protocol POST requests.
//!
//! Auth flow:
//!   1. Resolve credentials from the standard chain:
//!      - Environment variables: AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN
//!        (always present inside Lambda)
//!      - Shared credentials file: ~/.aws/credentials (profile support)
//!   2. Build the canonical request over content-type, host, x-amz-date,
//!      x-amz-target (and the session token when present).
//!   3. Sign with the date/region/service-scoped HMAC-SHA256 key.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::QueueError;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials resolved from the standard chain.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Headers to attach to a signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

/// Sign a POST with a JSON-protocol body (`X-Amz-Target` style APIs).
#[allow(clippy::too_many_arguments)]
pub fn sign_post(
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    url: &reqwest::Url,
    content_type: &str,
    amz_target: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, QueueError> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let host = url
        .host_str()
        .ok_or_else(|| QueueError::Config(format!("queue URL has no host: {url}")))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = match url.path() {
        "" => "/",
        p => p,
    };

    let payload_hash = hex::encode(Sha256::digest(body));

    // header names must be sorted
    let mut canonical_headers =
        format!("content-type:{content_type}\nhost:{host}\nx-amz-date:{amz_date}\n");
    let mut signed_headers = "content-type;host;x-amz-date".to_string();
    if let Some(ref token) = credentials.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }
    canonical_headers.push_str(&format!("x-amz-target:{amz_target}\n"));
    signed_headers.push_str(";x-amz-target");

    let canonical_request =
        format!("POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

    let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign =
        format!("AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{canonical_hash}");

    let signing_key =
        derive_signing_key(&credentials.secret_access_key, &date_stamp, region, service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, credential_scope, signed_headers, signature
    );

    Ok(SignedHeaders {
        amz_date,
        authorization,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Resolve AWS credentials from the standard chain:
/// 1. Environment variables
/// 2. ~/.aws/credentials file (with optional profile, AWS_PROFILE or "default")
pub fn resolve_credentials() -> Result<AwsCredentials, QueueError> {
    if let (Ok(key_id), Ok(secret)) = (
        std::env::var("AWS_ACCESS_KEY_ID"),
        std::env::var("AWS_SECRET_ACCESS_KEY"),
    ) {
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        return Ok(AwsCredentials {
            access_key_id: key_id,
            secret_access_key: secret,
            session_token,
        });
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let cred_path = format!("{home}/.aws/credentials");
    let content = std::fs::read_to_string(&cred_path).map_err(|_| {
        QueueError::Credentials(
            "set AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY env vars or configure ~/.aws/credentials"
                .into(),
        )
    })?;

    let profile = std::env::var("AWS_PROFILE").unwrap_or_else(|_| "default".to_string());
    parse_credentials_file(&content, &profile)
}

fn parse_credentials_file(content: &str, profile: &str) -> Result<AwsCredentials, QueueError> {
    let mut in_profile = false;
    let mut key_id = None;
    let mut secret = None;
    let mut session_token = None;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') && line.ends_with(']') {
            in_profile = &line[1..line.len() - 1] == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().to_string();
            match k.trim() {
                "aws_access_key_id" => key_id = Some(v),
                "aws_secret_access_key" => secret = Some(v),
                "aws_session_token" => session_token = Some(v),
                _ => {}
            }
        }
    }

    match (key_id, secret) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token,
        }),
        _ => Err(QueueError::Credentials(format!(
            "AWS profile '{profile}' not found or incomplete in ~/.aws/credentials"
        ))),
    }
}
