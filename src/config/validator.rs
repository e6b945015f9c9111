use crate::config::{Config, BACKEND_OLLAMA, BACKEND_OPENAI, SEARCH_LIMIT_CEILING};
use crate::error::{Result, SanadError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_search(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SanadError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.database_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_file",
                "Database file cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.vectors_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "index.vectors_file",
                "Vectors file path cannot be empty",
            ));
        }

        if config.index.mapping_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "index.mapping_file",
                "Mapping file path cannot be empty",
            ));
        }

        // Both artifacts are written together, one path for both would clobber
        if config.index.vectors_file == config.index.mapping_file {
            errors.push(ValidationError::new(
                "index.mapping_file",
                "Mapping file must differ from vectors file",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        if config.llm.enabled && config.llm.backends.is_empty() {
            errors.push(ValidationError::new(
                "llm.backends",
                "At least one backend is required when the LLM is enabled",
            ));
        }

        let valid_backends = [BACKEND_OLLAMA, BACKEND_OPENAI];
        for backend in &config.llm.backends {
            if !valid_backends.contains(&backend.as_str()) {
                errors.push(ValidationError::new(
                    "llm.backends",
                    format!(
                        "Backend must be one of {:?}, got '{}'",
                        valid_backends, backend
                    ),
                ));
            }
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;
        if search.max_limit == 0 || search.max_limit > SEARCH_LIMIT_CEILING {
            errors.push(ValidationError::new(
                "search.max_limit",
                format!(
                    "Max limit must be between 1 and {}, got {}",
                    SEARCH_LIMIT_CEILING, search.max_limit
                ),
            ));
        }

        if search.default_limit == 0 || search.default_limit > search.max_limit {
            errors.push(ValidationError::new(
                "search.default_limit",
                format!(
                    "Default limit must be between 1 and {}, got {}",
                    search.max_limit, search.default_limit
                ),
            ));
        }
    }
}
