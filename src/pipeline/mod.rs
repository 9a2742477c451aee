//! Ordered model fallback.
//!
//! One query is offered to each configured model identifier in turn until
//! one produces text. Attempts are strictly sequential and each identifier is
//! tried at most once per invocation: fallback, never racing or retrying.

pub mod gemini;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::validation::ValidatedQuery;

/// A single failed generation call against one model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("response contained no text")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Decode(String),
}

/// External text-generation service. Injected so tests can script
/// per-model failures without a network.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Failure(GenerationError),
}

/// One entry in the ordered attempt log of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt {
    pub model: String,
    pub outcome: AttemptOutcome,
}

/// Tagged result of walking the model list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `attempts` holds every attempt in order, ending with the successful one.
    Success {
        model: String,
        text: String,
        attempts: Vec<ModelAttempt>,
    },
    /// Every model failed; `attempts` has one entry per configured model.
    Failure { attempts: Vec<ModelAttempt> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("no generation models configured")]
    NoModelsConfigured,

    #[error("{}", AllFailed(.attempts))]
    AllModelsFailed { attempts: Vec<ModelAttempt> },
}

impl PipelineError {
    /// The terminal attempt. Always present for `AllModelsFailed`.
    pub fn last_attempt(&self) -> Option<&ModelAttempt> {
        match self {
            PipelineError::NoModelsConfigured => None,
            PipelineError::AllModelsFailed { attempts } => attempts.last(),
        }
    }
}

struct AllFailed<'a>(&'a [ModelAttempt]);

impl fmt::Display for AllFailed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} model(s) failed", self.0.len())?;
        if let Some(ModelAttempt {
            model,
            outcome: AttemptOutcome::Failure(e),
        }) = self.0.last()
        {
            write!(f, "; last error from {}: {}", model, e)?;
        }
        Ok(())
    }
}

pub struct ModelPipeline {
    models: Vec<String>,
    client: Arc<dyn GenerativeClient>,
}

impl ModelPipeline {
    /// `models` is in priority order: preferred first.
    pub fn new(models: Vec<String>, client: Arc<dyn GenerativeClient>) -> Self {
        Self { models, client }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Walk the model list once. Per-model failures are recorded and the walk
    /// continues; only an empty list is an error.
    pub async fn run(&self, query: &ValidatedQuery) -> Result<Outcome, PipelineError> {
        if self.models.is_empty() {
            return Err(PipelineError::NoModelsConfigured);
        }

        let mut attempts = Vec::with_capacity(self.models.len());
        for (i, model) in self.models.iter().enumerate() {
            tracing::debug!(model = %model, attempt = i + 1, "trying model");
            match self.client.generate(model, query.as_str()).await {
                Ok(text) => {
                    tracing::info!(model = %model, attempt = i + 1, "generation succeeded");
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        outcome: AttemptOutcome::Success(text.clone()),
                    });
                    return Ok(Outcome::Success {
                        model: model.clone(),
                        text,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(model = %model, attempt = i + 1, "generation failed: {}", e);
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        outcome: AttemptOutcome::Failure(e),
                    });
                }
            }
        }

        Ok(Outcome::Failure { attempts })
    }

    /// First successful text, unchanged, or the aggregated failure.
    pub async fn invoke(&self, query: &ValidatedQuery) -> Result<String, PipelineError> {
        match self.run(query).await? {
            Outcome::Success { text, .. } => Ok(text),
            Outcome::Failure { attempts } => Err(PipelineError::AllModelsFailed { attempts }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;
    use crate::validation::validate;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn query() -> ValidatedQuery {
        validate("best budget laptop").unwrap()
    }

    #[tokio::test]
    async fn test_first_model_success_short_circuits() {
        let client = Arc::new(ScriptedClient::succeeding(&[("m1", "one"), ("m2", "two")]));
        let pipeline = ModelPipeline::new(models(&["m1", "m2", "m3"]), client.clone());

        assert_eq!(pipeline.invoke(&query()).await.unwrap(), "one");
        assert_eq!(client.calls(), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_falls_back_until_kth_model_succeeds() {
        let client = Arc::new(ScriptedClient::succeeding(&[("m3", "Consider X")]));
        let pipeline = ModelPipeline::new(models(&["m1", "m2", "m3", "m4"]), client.clone());

        let outcome = pipeline.run(&query()).await.unwrap();
        match outcome {
            Outcome::Success { model, text, attempts } => {
                assert_eq!(model, "m3");
                assert_eq!(text, "Consider X");
                assert_eq!(attempts.len(), 3);
                assert!(matches!(attempts[0].outcome, AttemptOutcome::Failure(_)));
                assert!(matches!(attempts[1].outcome, AttemptOutcome::Failure(_)));
                assert_eq!(attempts[2].outcome, AttemptOutcome::Success("Consider X".into()));
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(client.calls(), vec!["m1", "m2", "m3"], "m4 must never be called");
    }

    #[tokio::test]
    async fn test_all_fail_calls_each_model_exactly_once() {
        let client = Arc::new(ScriptedClient::default());
        let pipeline = ModelPipeline::new(models(&["m1", "m2", "m3"]), client.clone());

        let err = pipeline.invoke(&query()).await.unwrap_err();
        assert_eq!(client.calls(), vec!["m1", "m2", "m3"]);

        let last = err.last_attempt().expect("terminal error must be present");
        assert_eq!(last.model, "m3");
        assert!(matches!(last.outcome, AttemptOutcome::Failure(_)));
        assert!(err.to_string().contains("last error from m3"));
    }

    #[tokio::test]
    async fn test_empty_model_list_fails_before_any_call() {
        let client = Arc::new(ScriptedClient::succeeding(&[("m1", "never")]));
        let pipeline = ModelPipeline::new(Vec::new(), client.clone());

        assert_eq!(
            pipeline.invoke(&query()).await,
            Err(PipelineError::NoModelsConfigured)
        );
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_output_returned_unchanged() {
        let raw = "  <b>Consider X</b>\n";
        let client = Arc::new(ScriptedClient::succeeding(&[("m1", raw)]));
        let pipeline = ModelPipeline::new(models(&["m1"]), client);

        assert_eq!(pipeline.invoke(&query()).await.unwrap(), raw);
    }
}
