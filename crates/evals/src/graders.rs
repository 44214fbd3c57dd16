//! Graders score a finished transcript.
//!
//! `ContentContains` is mechanical: score = needles found / needles sought,
//! with optional forbidden strings that each cost a point. `LlmJudge` asks a
//! judge model to grade against a rubric and parses a `{grade, reasoning,
//! suggestions}` object out of its answer.

use hearth_core::message::{MessageParam, Role};
use hearth_core::provider::{Provider, ProviderRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// One grader's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeResult {
    pub grader: String,
    pub score: f64,
    pub possible: f64,
    pub reasoning: String,
}

/// A transcript grader.
#[derive(Debug, Clone)]
pub enum Grader {
    /// Score by substring presence in the final assistant text.
    ContentContains {
        needles: Vec<String>,
        forbidden: Vec<String>,
    },
    /// Ask a judge model to score the whole transcript against a rubric.
    LlmJudge { rubric: String },
}

impl Grader {
    pub fn contains(needles: &[&str]) -> Self {
        Grader::ContentContains {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            forbidden: Vec::new(),
        }
    }

    pub fn contains_without(needles: &[&str], forbidden: &[&str]) -> Self {
        Grader::ContentContains {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            forbidden: forbidden.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn judge(rubric: &str) -> Self {
        Grader::LlmJudge {
            rubric: rubric.to_string(),
        }
    }

    /// Apply this grader to a transcript.
    pub async fn grade(
        &self,
        transcript: &[MessageParam],
        judge: Option<(&Arc<dyn Provider>, &str)>,
    ) -> GradeResult {
        match self {
            Grader::ContentContains { needles, forbidden } => {
                Self::grade_contains(transcript, needles, forbidden)
            }
            Grader::LlmJudge { rubric } => match judge {
                Some((provider, model)) => Self::grade_judged(transcript, rubric, provider, model).await,
                None => GradeResult {
                    grader: "llm-judge".into(),
                    score: 0.0,
                    possible: 5.0,
                    reasoning: "no judge model configured".into(),
                },
            },
        }
    }

    fn final_assistant_text(transcript: &[MessageParam]) -> String {
        transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.text().is_empty())
            .map(|m| m.text())
            .unwrap_or_default()
    }

    fn grade_contains(
        transcript: &[MessageParam],
        needles: &[String],
        forbidden: &[String],
    ) -> GradeResult {
        let text = Self::final_assistant_text(transcript);
        let found: Vec<&String> = needles.iter().filter(|n| text.contains(n.as_str())).collect();
        let violations: Vec<&String> = forbidden
            .iter()
            .filter(|n| text.contains(n.as_str()))
            .collect();

        let possible = needles.len().max(1) as f64;
        let score = (found.len() as f64 - violations.len() as f64).max(0.0);

        let mut reasoning = format!("found {}/{} expected strings", found.len(), needles.len());
        if !violations.is_empty() {
            reasoning.push_str(&format!(
                "; {} forbidden strings present",
                violations.len()
            ));
        }

        GradeResult {
            grader: "content-contains".into(),
            score,
            possible,
            reasoning,
        }
    }

    async fn grade_judged(
        transcript: &[MessageParam],
        rubric: &str,
        provider: &Arc<dyn Provider>,
        model: &str,
    ) -> GradeResult {
        let rendered = transcript
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("[{role}] {}", serde_json::to_string(&m.content).unwrap_or_default())
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Grade the following assistant transcript against this rubric.\n\n\
             Rubric: {rubric}\n\nTranscript:\n{rendered}\n\n\
             Answer with ONLY a JSON object: \
             {{\"grade\": <integer 1-5>, \"reasoning\": \"...\", \"suggestions\": \"...\"}}"
        );

        let request = ProviderRequest {
            model: model.to_string(),
            system: Some("You are a strict grader. Output only the JSON object.".into()),
            messages: vec![MessageParam::user(prompt)],
            tools: vec![],
            max_tokens: 1024,
            temperature: 0.0,
        };

        let answer = match provider.complete(request).await {
            Ok(response) => response.message.text(),
            Err(e) => {
                warn!(error = %e, "judge model call failed");
                return GradeResult {
                    grader: "llm-judge".into(),
                    score: 0.0,
                    possible: 5.0,
                    reasoning: format!("judge call failed: {e}"),
                };
            }
        };

        match parse_judgement(&answer) {
            Some(judgement) => GradeResult {
                grader: "llm-judge".into(),
                score: f64::from(judgement.grade.clamp(1, 5)),
                possible: 5.0,
                reasoning: judgement.reasoning,
            },
            None => GradeResult {
                grader: "llm-judge".into(),
                score: 0.0,
                possible: 5.0,
                reasoning: format!("unparseable judge answer: {answer}"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Judgement {
    grade: i32,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    #[allow(dead_code)]
    suggestions: String,
}

/// Pull the first JSON object out of a possibly chatty judge answer.
fn parse_judgement(answer: &str) -> Option<Judgement> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    serde_json::from_str(&answer[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript_ending(text: &str) -> Vec<MessageParam> {
        vec![
            MessageParam::user("list the lights"),
            MessageParam::assistant(text),
        ]
    }

    #[tokio::test]
    async fn contains_scores_fractionally() {
        let grader = Grader::contains(&["Bookshelf Light", "Overhead Light", "TV Lightstrip"]);
        let result = grader
            .grade(
                &transcript_ending("Bookshelf Light and Overhead Light are in the living room"),
                None,
            )
            .await;
        assert_eq!(result.score, 2.0);
        assert_eq!(result.possible, 3.0);
    }

    #[tokio::test]
    async fn forbidden_strings_cost_points() {
        let grader = Grader::contains_without(&["Bookshelf Light"], &["light.bookshelf_light"]);
        let result = grader
            .grade(
                &transcript_ending("Bookshelf Light (light.bookshelf_light)"),
                None,
            )
            .await;
        assert_eq!(result.score, 0.0);
        assert!(result.reasoning.contains("forbidden"));
    }

    #[tokio::test]
    async fn grades_the_final_assistant_message_only() {
        let transcript = vec![
            MessageParam::user("go"),
            MessageParam::assistant("Bookshelf Light"),
            MessageParam::user("more"),
            MessageParam::assistant("all done"),
        ];
        let grader = Grader::contains(&["Bookshelf Light"]);
        let result = grader.grade(&transcript, None).await;
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn judgement_parses_from_chatty_answer() {
        let answer = "Here is my grade:\n{\"grade\": 4, \"reasoning\": \"mostly right\", \"suggestions\": \"be terser\"}\nThanks!";
        let judgement = parse_judgement(answer).unwrap();
        assert_eq!(judgement.grade, 4);
        assert_eq!(judgement.reasoning, "mostly right");
    }

    #[test]
    fn garbage_judgement_is_none() {
        assert!(parse_judgement("no json here").is_none());
    }
}
