use crate::config::Config;
use crate::error::{QuarryError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_classifier(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(QuarryError::ConfigValidation { errors })
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Provider timeout must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.hnsw_m < 2 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be at least 2",
            ));
        }

        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "Construction breadth must be greater than 0",
            ));
        }

        if config.index.ef_search == 0 {
            errors.push(ValidationError::new(
                "index.ef_search",
                "Search breadth must be greater than 0",
            ));
        }

        if config.index.capacity == 0 {
            errors.push(ValidationError::new(
                "index.capacity",
                "Capacity hint must be greater than 0",
            ));
        }
    }

    fn validate_classifier(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.classifier.labels.is_empty() {
            errors.push(ValidationError::new(
                "classifier.labels",
                "Intent label set cannot be empty",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for label in &config.classifier.labels {
            if label.is_empty() {
                errors.push(ValidationError::new(
                    "classifier.labels",
                    "Intent labels cannot be empty strings",
                ));
            }
            if !seen.insert(label) {
                errors.push(ValidationError::new(
                    "classifier.labels",
                    format!("Duplicate intent label: {}", label),
                ));
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.default_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_k",
                "Default k must be greater than 0",
            ));
        }

        let tau_intent = config.retrieval.intent_threshold;
        if !(0.0..=1.0).contains(&tau_intent) {
            errors.push(ValidationError::new(
                "retrieval.intent_threshold",
                format!("Intent threshold must be in [0, 1], got {}", tau_intent),
            ));
        }

        let tau_sim = config.retrieval.similarity_threshold;
        if !(0.0..=1.0).contains(&tau_sim) {
            errors.push(ValidationError::new(
                "retrieval.similarity_threshold",
                format!("Similarity threshold must be in [0, 1], got {}", tau_sim),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_dimension() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.retrieval.intent_threshold = 1.5;
        let err = ConfigValidator::validate(&config).unwrap_err();
        match err {
            QuarryError::ConfigValidation { errors } => {
                assert!(errors.iter().any(|e| e.path == "retrieval.intent_threshold"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let mut config = Config::default();
        config.classifier.labels = vec!["a".to_string(), "a".to_string()];
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        config.retrieval.default_k = 0;
        match ConfigValidator::validate(&config).unwrap_err() {
            QuarryError::ConfigValidation { errors } => assert!(errors.len() >= 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
