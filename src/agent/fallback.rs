// MindHarbor - Crisis override and rule-based fallback responder
//
// Fixed keyword rules checked in priority order against the lower-cased
// message; first match wins. Matching is plain substring search with no word
// boundaries ("sad" also matches inside longer words).

use serde::Serialize;

/// Phrases that always trigger the crisis-resources reply.
pub const CRISIS_PHRASES: &[&str] = &["suicide", "kill myself", "end it all"];

pub const CRISIS_RESPONSE: &str = "I'm very concerned about what you're sharing. Please reach out for immediate help: National Suicide Prevention Lifeline: 988, Crisis Text Line: Text HOME to 741741, or Emergency Services: 911. You matter, and there are people who want to help you through this difficult time.";

pub const DEFAULT_RESPONSE: &str = "Thank you for sharing with me. I'm here to listen and support you. Mental health is a journey, and it's okay to have ups and downs. What you're feeling is valid, and seeking support shows strength. Can you tell me more about what's on your mind today?";

/// Appended to generated replies.
pub const DISCLAIMER: &str = "\n\nRemember, I'm here to support you, but I'm not a replacement for professional mental health care. If you're in crisis or need immediate help, please contact a mental health professional or emergency services.";

const ANXIETY_RESPONSE: &str = "I understand you're feeling anxious. Anxiety is very common and treatable. Try some deep breathing: breathe in for 4 counts, hold for 4, breathe out for 6. Remember that anxiety often makes situations seem worse than they are. What specific situation is causing you anxiety right now?";

const DEPRESSION_RESPONSE: &str = "I hear that you're going through a difficult time. Depression can make everything feel overwhelming, but it's important to remember that these feelings are temporary and treatable. Small steps can make a big difference - have you been able to do any activities you usually enjoy, even briefly?";

const STRESS_RESPONSE: &str = "Stress can feel overwhelming, but there are ways to manage it. Try breaking down what's stressing you into smaller, manageable parts. What's the most pressing thing you're dealing with right now? Sometimes just talking through it can help clarify next steps.";

const SLEEP_RESPONSE: &str = "Sleep issues can significantly impact mental health. Good sleep hygiene includes: keeping a consistent sleep schedule, avoiding screens before bed, creating a calm environment, and avoiding caffeine late in the day. Have you noticed any patterns in what might be affecting your sleep?";

const POSITIVE_RESPONSE: &str = "I'm so glad to hear you're feeling better! It's wonderful that you're making progress. Remember to celebrate these positive moments - they're important milestones in your healing journey. What has been helping you feel better?";

const GRATITUDE_RESPONSE: &str = "Gratitude is a powerful tool for mental wellness. It's great that you're recognizing positive aspects in your life. Practicing gratitude regularly can help shift our perspective and improve mood. What are you most grateful for today?";

/// Case-insensitive substring check against [`CRISIS_PHRASES`].
pub fn is_crisis(message: &str) -> bool {
    let lower = message.to_lowercase();
    CRISIS_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Crisis,
    Anxiety,
    Depression,
    Stress,
    Sleep,
    Positive,
    Gratitude,
    General,
}

#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub topic: Topic,
    pub keywords: &'static [&'static str],
    pub response: &'static str,
}

/// Deterministic keyword responder. Total and side-effect free.
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    rules: Vec<KeywordRule>,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackResponder {
    pub fn new() -> Self {
        let rules = vec![
            KeywordRule {
                topic: Topic::Crisis,
                keywords: CRISIS_PHRASES,
                response: CRISIS_RESPONSE,
            },
            KeywordRule {
                topic: Topic::Anxiety,
                keywords: &["anxious", "anxiety", "worried", "panic"],
                response: ANXIETY_RESPONSE,
            },
            KeywordRule {
                topic: Topic::Depression,
                keywords: &["depressed", "depression", "sad", "hopeless"],
                response: DEPRESSION_RESPONSE,
            },
            KeywordRule {
                topic: Topic::Stress,
                keywords: &["stress", "overwhelmed", "pressure"],
                response: STRESS_RESPONSE,
            },
            KeywordRule {
                topic: Topic::Sleep,
                keywords: &["sleep", "insomnia", "tired"],
                response: SLEEP_RESPONSE,
            },
            KeywordRule {
                topic: Topic::Positive,
                keywords: &["better", "good", "happy", "progress"],
                response: POSITIVE_RESPONSE,
            },
            KeywordRule {
                topic: Topic::Gratitude,
                keywords: &["grateful", "thankful", "coping"],
                response: GRATITUDE_RESPONSE,
            },
        ];
        Self { rules }
    }

    /// The first rule whose keywords appear in the message, if any.
    fn matching_rule(&self, message: &str) -> Option<&KeywordRule> {
        let lower = message.to_lowercase();
        self.rules.iter().find(|rule| {
            rule.keywords.iter().any(|keyword| {
                let hit = lower.contains(keyword);
                if hit {
                    tracing::debug!(keyword = %keyword, topic = ?rule.topic, "Fallback rule matched");
                }
                hit
            })
        })
    }

    pub fn classify(&self, message: &str) -> Topic {
        self.matching_rule(message)
            .map(|rule| rule.topic)
            .unwrap_or(Topic::General)
    }

    /// Canned reply for `message`; never empty.
    pub fn respond(&self, message: &str) -> &'static str {
        self.matching_rule(message)
            .map(|rule| rule.response)
            .unwrap_or(DEFAULT_RESPONSE)
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }
}
