use domain::{DomainError, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ApplicationError {
    /// 取出领域错误，便于调用方按错误种类分支
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ApplicationError::Domain(err) => Some(err),
            _ => None,
        }
    }
}
