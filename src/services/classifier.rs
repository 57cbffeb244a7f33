use crate::services::ai_client::{decode_json, AiCompleter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// Intent of a free-text candidate reply. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    PositiveReady,
    PositiveWithQuestions,
    RequestDeadlineExtension,
    QuestionsAboutJob,
    Negative,
    TestTaskSubmission,
    Unclear,
}

impl ReplyCategory {
    pub const ALL: [ReplyCategory; 7] = [
        ReplyCategory::PositiveReady,
        ReplyCategory::PositiveWithQuestions,
        ReplyCategory::RequestDeadlineExtension,
        ReplyCategory::QuestionsAboutJob,
        ReplyCategory::Negative,
        ReplyCategory::TestTaskSubmission,
        ReplyCategory::Unclear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReplyCategory::PositiveReady => "positive_ready",
            ReplyCategory::PositiveWithQuestions => "positive_with_questions",
            ReplyCategory::RequestDeadlineExtension => "request_deadline_extension",
            ReplyCategory::QuestionsAboutJob => "questions_about_job",
            ReplyCategory::Negative => "negative",
            ReplyCategory::TestTaskSubmission => "test_task_submission",
            ReplyCategory::Unclear => "unclear",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn is_positive(self) -> bool {
        matches!(
            self,
            ReplyCategory::PositiveReady | ReplyCategory::PositiveWithQuestions
        )
    }

    fn describe(self) -> &'static str {
        match self {
            ReplyCategory::PositiveReady => "the candidate agrees to continue",
            ReplyCategory::PositiveWithQuestions => "the candidate is interested but asks something first",
            ReplyCategory::RequestDeadlineExtension => "the candidate asks for more time for the test task",
            ReplyCategory::QuestionsAboutJob => "questions about the position, salary or conditions without a clear yes or no",
            ReplyCategory::Negative => "the candidate declines or is not interested",
            ReplyCategory::TestTaskSubmission => "the candidate sends or announces a finished test task",
            ReplyCategory::Unclear => "none of the above",
        }
    }
}

impl fmt::Display for ReplyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationContext {
    pub has_received_test_task: bool,
    pub test_task_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: ReplyCategory,
    pub confidence: f64,
    pub extracted_info: JsonValue,
}

impl Classification {
    pub fn unclear() -> Self {
        Self {
            category: ReplyCategory::Unclear,
            confidence: 0.5,
            extracted_info: json!({}),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    category: String,
    confidence: Option<f64>,
    #[serde(default, alias = "extractedInfo")]
    extracted_info: Option<JsonValue>,
}

#[derive(Clone)]
pub struct ResponseClassifier {
    ai: Arc<dyn AiCompleter>,
}

impl ResponseClassifier {
    pub fn new(ai: Arc<dyn AiCompleter>) -> Self {
        Self { ai }
    }

    /// Classifies `message`. Any model failure degrades to `unclear` with
    /// confidence 0.5, and a deadline-extension verdict is never returned
    /// to a candidate who has not received a test task.
    pub async fn classify(&self, message: &str, ctx: ClassificationContext) -> Classification {
        let allowed: Vec<ReplyCategory> = ReplyCategory::ALL
            .into_iter()
            .filter(|c| ctx.has_received_test_task || *c != ReplyCategory::RequestDeadlineExtension)
            .collect();

        let categories = allowed
            .iter()
            .map(|c| format!("- {}: {}", c.as_str(), c.describe()))
            .collect::<Vec<_>>()
            .join("\n");
        let system_prompt = format!(
            "You classify replies of job candidates written in Ukrainian, Russian or English.\n\
Allowed categories:\n{}\n\
Respond with a JSON object: {{\"category\": \"<one of the allowed categories>\", \
\"confidence\": <0..1>, \"extracted_info\": {{}}}}. Use extracted_info for concrete details such as \
requested dates or questions.",
            categories
        );
        let user_prompt = json!({
            "message": message,
            "has_received_test_task": ctx.has_received_test_task,
            "test_task_deadline": ctx.test_task_deadline,
        })
        .to_string();

        let raw = match self.ai.complete(&system_prompt, &user_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = ?e, "Reply classification failed, defaulting to unclear");
                return Classification::unclear();
            }
        };

        let Some(parsed) = decode_json::<RawClassification>(&raw) else {
            tracing::warn!("Unparseable classification response, defaulting to unclear");
            return Classification::unclear();
        };
        let Some(category) = ReplyCategory::parse(&parsed.category) else {
            tracing::warn!(category = %parsed.category, "Unknown reply category, defaulting to unclear");
            return Classification::unclear();
        };

        if !allowed.contains(&category) {
            tracing::warn!(
                category = %category,
                "Category not allowed without a test task, downgrading to unclear"
            );
            return Classification {
                category: ReplyCategory::Unclear,
                confidence: 0.5,
                extracted_info: parsed.extracted_info.unwrap_or_else(|| json!({})),
            };
        }

        let confidence = parsed
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.5);

        Classification {
            category,
            confidence,
            extracted_info: parsed.extracted_info.unwrap_or_else(|| json!({})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::services::ai_client::MockAiCompleter;

    fn classifier_answering(answer: &'static str) -> ResponseClassifier {
        let mut ai = MockAiCompleter::new();
        ai.expect_complete().returning(move |_, _| Ok(answer.to_string()));
        ResponseClassifier::new(Arc::new(ai))
    }

    fn with_test_task() -> ClassificationContext {
        ClassificationContext {
            has_received_test_task: true,
            test_task_deadline: None,
        }
    }

    #[tokio::test]
    async fn parses_wrapped_json() {
        let classifier = classifier_answering(
            "Result: {\"category\": \"negative\", \"confidence\": 0.93, \"extracted_info\": {}}",
        );
        let result = classifier.classify("Ні, дякую", with_test_task()).await;
        assert_eq!(result.category, ReplyCategory::Negative);
        assert!((result.confidence - 0.93).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn garbage_degrades_to_unclear() {
        let classifier = classifier_answering("I think the candidate is happy");
        assert_eq!(
            classifier.classify("так", with_test_task()).await,
            Classification::unclear()
        );

        let classifier = classifier_answering("{\"category\": \"maybe\"}");
        assert_eq!(
            classifier.classify("так", with_test_task()).await,
            Classification::unclear()
        );
    }

    #[tokio::test]
    async fn model_error_degrades_to_unclear() {
        let mut ai = MockAiCompleter::new();
        ai.expect_complete()
            .returning(|_, _| Err(Error::Internal("timeout".into())));
        let classifier = ResponseClassifier::new(Arc::new(ai));
        assert_eq!(
            classifier.classify("так", with_test_task()).await,
            Classification::unclear()
        );
    }

    #[tokio::test]
    async fn extension_only_offered_after_test_task() {
        let mut ai = MockAiCompleter::new();
        ai.expect_complete()
            .withf(|system, _| !system.contains("request_deadline_extension"))
            .returning(|_, _| {
                Ok("{\"category\": \"request_deadline_extension\", \"confidence\": 0.9}".into())
            });
        let classifier = ResponseClassifier::new(Arc::new(ai));

        let result = classifier
            .classify("можна ще пару днів?", ClassificationContext::default())
            .await;
        assert_eq!(result.category, ReplyCategory::Unclear);
    }

    #[tokio::test]
    async fn confidence_is_clamped() {
        let classifier =
            classifier_answering("{\"category\": \"positive_ready\", \"confidence\": 7}");
        let result = classifier.classify("так!", with_test_task()).await;
        assert_eq!(result.category, ReplyCategory::PositiveReady);
        assert_eq!(result.confidence, 1.0);
    }
}
