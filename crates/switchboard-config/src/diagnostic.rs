// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction failures into miette diagnostics.
//!
//! Unknown keys get a "did you mean" hint (Jaro-Winkler similarity) and, when
//! the offending file can be located, a labelled source span.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Similarity below which no suggestion is offered.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration problem, renderable by miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(switchboard::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys accepted in the same table.
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for `{key}`: {detail}")]
    #[diagnostic(code(switchboard::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(switchboard::config::missing_key),
        help("add `{key} = <value>` to switchboard.toml")
    )]
    MissingKey { key: String },

    #[error("validation error: {message}")]
    #[diagnostic(code(switchboard::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(switchboard::config::other))]
    Other(String),
}

impl From<ConfigError> for switchboard_core::SwitchboardError {
    fn from(err: ConfigError) -> Self {
        switchboard_core::SwitchboardError::Config(err.to_string())
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Converts every error carried by `err` into a [`ConfigError`].
///
/// `sources` pairs file paths with their contents so unknown keys can be
/// pointed at in the original file.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, sources))
        .collect()
}

fn convert(error: &figment::Error, sources: &[(String, String)]) -> ConfigError {
    use figment::error::Kind;

    let dotted_path = || error.path.join(".");

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let (span, src) = locate(error, field, sources);
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: suggest_key(field, expected),
                valid_keys: expected.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: field.to_string(),
        },
        Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
            key: dotted_path(),
            detail: format!("found {actual}"),
            expected: expected.clone(),
        },
        _ => ConfigError::Other(error.to_string()),
    }
}

/// Finds the file an error came from and the key's byte span within it.
fn locate(
    error: &figment::Error,
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .map(|s| match s {
            figment::Source::File(path) => path.display().to_string(),
            _ => "<inline>".to_string(),
        });

    let Some((name, content)) = origin.and_then(|origin| {
        sources
            .iter()
            .find(|(name, _)| *name == origin)
            .map(|(n, c)| (n.clone(), c.clone()))
    }) else {
        return (None, None);
    };

    let table = error.path.first().map(String::as_str);
    match find_key_offset(&content, table, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content)),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside `[table]`, or at top level when
/// `table` is `None`.
///
/// Walks the document line by line tracking the current table header, so a
/// key with the same name in another table is not matched.
pub fn find_key_offset(content: &str, table: Option<&str>, field: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(header) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.split(']').next())
        {
            current = Some(header.trim());
        } else if current == table
            && let Some(after) = trimmed.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(offset + indent);
        }

        offset += line.len();
    }

    None
}

/// Best-scoring valid key above the similarity threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Renders diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
