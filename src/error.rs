use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FqdbErrorCode {
    InvalidFormat,
    InvalidRequest,
    InvalidConfig,
    ModelLocked,
    ModelExists,
    ModelDoesNotExist,
    ModelNotDeleted,
}

impl FqdbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FqdbErrorCode::InvalidFormat => "invalid_format",
            FqdbErrorCode::InvalidRequest => "invalid_request",
            FqdbErrorCode::InvalidConfig => "invalid_config",
            FqdbErrorCode::ModelLocked => "model_locked",
            FqdbErrorCode::ModelExists => "model_exists",
            FqdbErrorCode::ModelDoesNotExist => "model_does_not_exist",
            FqdbErrorCode::ModelNotDeleted => "model_not_deleted",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FqdbError {
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("locked fields key '{key}' is stale")]
    ModelLocked { key: String },
    #[error("model '{fqid}' already exists")]
    ModelExists { fqid: String },
    #[error("model '{fqid}' does not exist")]
    ModelDoesNotExist { fqid: String },
    #[error("model '{fqid}' is not deleted")]
    ModelNotDeleted { fqid: String },
}

impl FqdbError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        FqdbError::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        FqdbError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn code(&self) -> FqdbErrorCode {
        match self {
            FqdbError::InvalidFormat { .. } => FqdbErrorCode::InvalidFormat,
            FqdbError::InvalidRequest { .. } => FqdbErrorCode::InvalidRequest,
            FqdbError::InvalidConfig { .. } => FqdbErrorCode::InvalidConfig,
            FqdbError::ModelLocked { .. } => FqdbErrorCode::ModelLocked,
            FqdbError::ModelExists { .. } => FqdbErrorCode::ModelExists,
            FqdbError::ModelDoesNotExist { .. } => FqdbErrorCode::ModelDoesNotExist,
            FqdbError::ModelNotDeleted { .. } => FqdbErrorCode::ModelNotDeleted,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::{FqdbError, FqdbErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(FqdbErrorCode::InvalidFormat.as_str(), "invalid_format");
        assert_eq!(FqdbErrorCode::ModelLocked.as_str(), "model_locked");
        assert_eq!(
            FqdbErrorCode::ModelDoesNotExist.as_str(),
            "model_does_not_exist"
        );
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = FqdbError::ModelLocked {
            key: "a/1/f".into(),
        };
        assert_eq!(err.code(), FqdbErrorCode::ModelLocked);
        assert_eq!(err.code_str(), "model_locked");

        let err = FqdbError::ModelExists { fqid: "a/1".into() };
        assert_eq!(err.code_str(), "model_exists");
    }
}
