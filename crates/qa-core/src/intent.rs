//! Inbound message classification
//!
//! Maps free-text user messages to an [`Intent`]. Confirmation replies are
//! recognized first, then edit requests, then questions; anything else is a
//! generation request carrying whatever document names, testing focus and
//! requirement code the message mentions.

use qa_generation::normalize_testing_type;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

macro_rules! pattern {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex).ok());
    };
}

const REPLY_TAIL: &str = r"[\s,.!]*(?:please|thanks|thank you)?[\s.!]*$";

static AFFIRM_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:yes please|go ahead|please do|sounds good|yes|yep|yeah|sure|okay|ok|proceed){REPLY_TAIL}"
    ))
    .ok()
});
static CONTINUE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)^\s*continue{REPLY_TAIL}")).ok());
static DECLINE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:no thanks|not now|nope|no|stop|cancel){REPLY_TAIL}"
    ))
    .ok()
});

pattern!(EDIT_RE, r"(?i)\b(?:edit|update|revise|modify|tweak|change|rewrite|rename|shorten)\b");
pattern!(EDIT_TARGET_RE, r"(?i)\b(?:test[\s_-]?cases?|cases?|steps?|titles?|expected|preconditions?)\b");
pattern!(QUESTION_RE, r"(?i)^\s*(?:what|which|how|why|when|where|who|does|do|is|are|list|show|tell)\b");
pattern!(TESTCASE_TOPIC_RE, r"(?i)\btest[\s_-]?cases?\b");
pattern!(REQUIREMENT_TOPIC_RE, r"(?i)\brequirements?\b");
pattern!(DOC_NAME_RE, r"(?i)[\w./-]+\.(?:txt|pdf)\b");
pattern!(TESTING_TYPE_RE, r"(?i)\b(unit|integration|system)\b");
pattern!(REQ_CODE_RE, r"(?i)\bREQ-\d+\b");
pattern!(DIRECT_RE, r"(?i)\b(?:directly|straight away|straight from|right away|without requirements)\b");

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

fn first_match(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    re.as_ref()?.find(text).map(|m| m.as_str().to_string())
}

/// What a question is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Stored requirements
    Requirements,
    /// Stored test cases
    Testcases,
}

/// Parameters of a generation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Document names to fetch (as written by the user)
    #[serde(default)]
    pub doc_names: Vec<String>,
    /// Testing focus, normalized
    #[serde(default)]
    pub testing_type: Option<String>,
    /// Write test cases straight from the documents
    #[serde(default)]
    pub direct: bool,
    /// Restrict test case generation to one requirement
    #[serde(default)]
    pub req_code: Option<String>,
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// "Yes please" and similar
    Affirm,
    /// Literal "CONTINUE"
    Continue,
    /// "No", "stop" and similar
    Decline,
    /// A question about stored artifacts
    Question {
        /// What is asked about
        topic: Topic,
        /// Question text
        text: String,
    },
    /// Rewrite stored test cases
    Edit {
        /// Instruction as written
        instruction: String,
    },
    /// Start or steer generation
    Generate(GenerationRequest),
}

/// Maps inbound messages to intents
#[cfg_attr(test, mockall::automock)]
pub trait IntentClassifier: Send + Sync {
    /// Classify one message
    fn classify(&self, message: &str) -> Intent;
}

/// Regex keyword classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    /// Create a classifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn generation_request(message: &str) -> GenerationRequest {
        let doc_names: Vec<String> = DOC_NAME_RE
            .as_ref()
            .map(|re| re.find_iter(message).map(|m| m.as_str().to_string()).collect())
            .unwrap_or_default();
        let mentions_cases = is_match(&TESTCASE_TOPIC_RE, message);
        let req_code = first_match(&REQ_CODE_RE, message).map(|c| c.to_ascii_uppercase());
        let mentions_requirements = is_match(&REQUIREMENT_TOPIC_RE, message) || req_code.is_some();
        let direct = is_match(&DIRECT_RE, message)
            || (mentions_cases && !mentions_requirements && !doc_names.is_empty());

        GenerationRequest {
            doc_names,
            testing_type: first_match(&TESTING_TYPE_RE, message).map(|t| normalize_testing_type(&t)),
            direct,
            req_code,
        }
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, message: &str) -> Intent {
        if is_match(&CONTINUE_RE, message) {
            return Intent::Continue;
        }
        if is_match(&AFFIRM_RE, message) {
            return Intent::Affirm;
        }
        if is_match(&DECLINE_RE, message) {
            return Intent::Decline;
        }
        if is_match(&EDIT_RE, message) && is_match(&EDIT_TARGET_RE, message) {
            return Intent::Edit {
                instruction: message.trim().to_string(),
            };
        }
        let asks = message.trim_end().ends_with('?') || is_match(&QUESTION_RE, message);
        if asks {
            let topic = if is_match(&TESTCASE_TOPIC_RE, message) {
                Some(Topic::Testcases)
            } else if is_match(&REQUIREMENT_TOPIC_RE, message) || is_match(&REQ_CODE_RE, message) {
                Some(Topic::Requirements)
            } else {
                None
            };
            if let Some(topic) = topic {
                return Intent::Question {
                    topic,
                    text: message.trim().to_string(),
                };
            }
        }
        Intent::Generate(Self::generation_request(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn classify(message: &str) -> Intent {
        KeywordIntentClassifier::new().classify(message)
    }

    #[test]
    fn confirmation_replies() {
        assert_eq!(classify("Yes please"), Intent::Affirm);
        assert_eq!(classify("ok!"), Intent::Affirm);
        assert_eq!(classify("CONTINUE"), Intent::Continue);
        assert_eq!(classify("continue please"), Intent::Continue);
        assert_eq!(classify("No thanks."), Intent::Decline);
        assert_ne!(classify("yes, and also add login docs.txt"), Intent::Affirm);
    }

    #[test]
    fn direct_request_from_documents() {
        let Intent::Generate(request) = classify("Generate me test cases for document test.pdf") else {
            panic!("expected a generation request");
        };
        assert_eq!(request.doc_names, vec!["test.pdf".to_string()]);
        assert!(request.direct);
        assert_eq!(request.req_code, None);
    }

    #[test]
    fn requirements_first_request() {
        let Intent::Generate(request) =
            classify("Extract requirements from specs/login.txt and billing.txt for integration testing")
        else {
            panic!("expected a generation request");
        };
        assert_eq!(
            request.doc_names,
            vec!["specs/login.txt".to_string(), "billing.txt".to_string()]
        );
        assert_eq!(request.testing_type.as_deref(), Some("integration"));
        assert!(!request.direct);
    }

    #[test]
    fn single_requirement_request() {
        let Intent::Generate(request) = classify("write test cases for req-4") else {
            panic!("expected a generation request");
        };
        assert_eq!(request.req_code.as_deref(), Some("REQ-4"));
        assert!(!request.direct);
    }

    #[test]
    fn edits_win_over_questions() {
        assert_eq!(
            classify("Can you update the test case titles to be shorter?"),
            Intent::Edit {
                instruction: "Can you update the test case titles to be shorter?".into()
            }
        );
    }

    #[test]
    fn questions_by_topic() {
        assert_eq!(
            classify("Which requirements cover password reset?"),
            Intent::Question {
                topic: Topic::Requirements,
                text: "Which requirements cover password reset?".into()
            }
        );
        assert!(matches!(
            classify("how many negative test cases do we have"),
            Intent::Question {
                topic: Topic::Testcases,
                ..
            }
        ));
    }

    #[test]
    fn testing_focus_reply() {
        let Intent::Generate(request) = classify("System testing") else {
            panic!("expected a generation request");
        };
        assert_eq!(request.testing_type.as_deref(), Some("system"));
        assert!(request.doc_names.is_empty());
    }

    proptest! {
        #[test]
        fn doc_names_are_found_anywhere(stem in "[a-z][a-z0-9_]{0,12}", ext in "(txt|pdf)") {
            let name = format!("{stem}.{ext}");
            let Intent::Generate(request) = classify(&format!("please load {name} now")) else {
                panic!("expected a generation request");
            };
            prop_assert_eq!(request.doc_names, vec![name]);
        }
    }
}
