//! Error taxonomy for each external-facing contract.
//!
//! Every failure is reported as a warning where it occurs. A run still ends
//! in `Failed` when generation yields no background ([`GenerationError`])
//! or when the compositor rejects its inputs ([`CompositeError`]).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthInitError {
    #[error("credential blob is not valid JSON: {source}")]
    InvalidJson {
        #[from]
        source: serde_json::Error,
    },

    #[error("credential file {path} unreadable: {source}")]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential blob is missing `{field}`")]
    MissingField { field: &'static str },

    #[error("credential private key rejected: {message}")]
    InvalidPrivateKey { message: String },

    #[error("no service-account credential configured (GOOGLE_KEY or GOOGLE_APPLICATION_CREDENTIALS)")]
    MissingCredential,

    #[error("no Imagen API key configured (IMAGEN_API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY)")]
    MissingApiKey,
}

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("search credentials missing: {message}")]
    MissingCredentials { message: String },

    #[error("search request failed: {message}")]
    Transport { message: String },

    #[error("search provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("search response malformed: {message}")]
    InvalidResponse { message: String },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("image generation unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("access token exchange failed: {message}")]
    Auth { message: String },

    #[error("generation request failed: {message}")]
    Transport { message: String },

    #[error("generation provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation blocked by content policy: {reason}")]
    Filtered { reason: String },

    #[error("generation response unusable: {message}")]
    InvalidResponse { message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("background image has no pixels ({width}x{height})")]
    EmptyBackground { width: u32, height: u32 },

    #[error("logo image has no pixels ({width}x{height})")]
    EmptyLogo { width: u32, height: u32 },

    #[error("logo scaled to {width}x{height} is more than {max_ratio} times the background height {background_height}")]
    OversizedLogo {
        width: u32,
        height: u64,
        background_height: u32,
        max_ratio: u32,
    },

    #[error("logo {logo_width}x{logo_height} scales to zero pixels on a {background_width}px wide background")]
    DegenerateScale {
        logo_width: u32,
        logo_height: u32,
        background_width: u32,
    },
}

/// Whether an `anyhow` chain bottoms out in a reqwest transport failure.
pub(crate) fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::{error_chain_text, truncate_text, CompositeError};

    #[test]
    fn error_chain_text_joins_and_dedupes_causes() {
        let err = Err::<(), _>(anyhow::anyhow!("socket closed"))
            .context("socket closed")
            .context("search request failed")
            .unwrap_err();
        assert_eq!(
            error_chain_text(&err, 200),
            "search request failed | caused by: socket closed"
        );
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn composite_errors_render_dimensions() {
        let err = CompositeError::EmptyLogo {
            width: 0,
            height: 40,
        };
        assert_eq!(err.to_string(), "logo image has no pixels (0x40)");
    }
}
