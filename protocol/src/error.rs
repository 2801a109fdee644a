//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use common::files::FileError;
use crypto::prelude::CryptoError;
use link::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PsiError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("data error: {0}")]
    Data(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<FileError> for PsiError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => PsiError::Io(e),
            FileError::Csv(e) => PsiError::Csv(e),
            other => PsiError::Data(other.to_string()),
        }
    }
}

impl From<CryptoError> for PsiError {
    fn from(e: CryptoError) -> Self {
        PsiError::Protocol(e.to_string())
    }
}

impl From<bincode::Error> for PsiError {
    fn from(e: bincode::Error) -> Self {
        PsiError::Protocol(format!("malformed message: {}", e))
    }
}

impl From<serde_json::Error> for PsiError {
    fn from(e: serde_json::Error) -> Self {
        PsiError::Config(e.to_string())
    }
}

impl PsiError {
    /// True when the failure came from a peer, nothing to tell it back
    pub fn is_peer_abort(&self) -> bool {
        matches!(self, PsiError::Link(LinkError::PeerAborted { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_errors_are_data_errors() {
        let e = PsiError::from(FileError::MissingField {
            field: String::from("id"),
            path: String::from("in.csv"),
        });
        assert!(matches!(e, PsiError::Data(_)));
        assert_eq!(
            e.to_string(),
            "data error: field `id` not found in header of in.csv"
        );
    }

    #[test]
    fn test_crypto_errors_are_protocol_errors() {
        let e = PsiError::from(CryptoError::InvalidPoint { index: 4 });
        assert!(matches!(e, PsiError::Protocol(_)));
    }
}
