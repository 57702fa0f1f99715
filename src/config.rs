use crate::error::FqdbError;

/// Runtime configuration for an fqdb writer instance.
#[derive(Debug, Clone)]
pub struct FqdbConfig {
    /// Upper bound on events in a single write request.
    pub max_events_per_request: usize,
    /// Upper bound on the number of locked-fields entries per request.
    pub max_locked_fields: usize,
    /// Upper bound on ids handed out by a single reservation call.
    pub max_reserve_amount: usize,
    /// Maximum byte length of a collection token.
    pub max_collection_bytes: usize,
    /// Maximum byte length of a field token.
    pub max_field_bytes: usize,
}

impl Default for FqdbConfig {
    fn default() -> Self {
        Self {
            max_events_per_request: 10_000,
            max_locked_fields: 4_096,
            max_reserve_amount: 4_096,
            max_collection_bytes: 32,
            max_field_bytes: 255,
        }
    }
}

impl FqdbConfig {
    pub fn validate(&self) -> Result<(), FqdbError> {
        if self.max_events_per_request == 0 {
            return Err(FqdbError::InvalidConfig {
                message: "max_events_per_request must be positive".into(),
            });
        }
        if self.max_reserve_amount == 0 {
            return Err(FqdbError::InvalidConfig {
                message: "max_reserve_amount must be positive".into(),
            });
        }
        if self.max_collection_bytes == 0 || self.max_field_bytes == 0 {
            return Err(FqdbError::InvalidConfig {
                message: "token length limits must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FqdbConfig;

    #[test]
    fn default_config_is_valid() {
        FqdbConfig::default().validate().expect("default config");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut config = FqdbConfig::default();
        config.max_reserve_amount = 0;
        let err = config.validate().expect_err("zero reserve amount");
        assert_eq!(err.code_str(), "invalid_config");
    }
}
