// QUAK/ESR Testdata - Errors
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use thiserror::Error;

/// Errors from generation and script files.
#[derive(Error, Debug)]
pub enum TestdataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Script parse error at line {line}: {message}")]
    ScriptParse { line: usize, message: String },

    #[error("Invalid generator config: {0}")]
    InvalidConfig(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, TestdataError>;
