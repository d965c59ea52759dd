// MindHarbor - Grounding prompt builder (retrieved knowledge + recent turns)

use crate::retrieval::SearchHit;
use crate::session::ChatMessage;

/// Assemble the single instruction sent to the generator: retrieved chunk
/// texts as the knowledge base, recent turns as conversation context, then
/// the new message. The closing line asks for crisis resources first so the
/// model backs up the keyword override.
pub fn build_grounding_prompt(hits: &[SearchHit<'_>], conversation: &[ChatMessage], message: &str) -> String {
    let knowledge = hits
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let conversation = conversation
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a compassionate mental health support assistant. Use the following knowledge base \
and conversation context to provide helpful, empathetic responses. Always prioritize user safety \
and encourage professional help when needed.\n\
\n\
Knowledge Base:\n\
{knowledge}\n\
\n\
Conversation Context:\n\
{conversation}\n\
\n\
User Message: {message}\n\
\n\
Provide a supportive, informative response based on the knowledge base. If the user expresses \
crisis thoughts, immediately provide crisis resources."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Chunk;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            document_id: "d".into(),
            source_label: "guide.txt".into(),
            text: text.into(),
            ordinal: 0,
        }
    }

    #[test]
    fn test_prompt_sections() {
        let a = chunk("Box breathing: in for 4, hold for 4.");
        let b = chunk("Grounding uses the five senses.");
        let hits = vec![
            SearchHit { chunk: &a, score: 0.8 },
            SearchHit { chunk: &b, score: 0.4 },
        ];
        let conversation = vec![
            ChatMessage::user("I can't calm down"),
            ChatMessage::assistant("That sounds hard."),
        ];

        let prompt = build_grounding_prompt(&hits, &conversation, "What can I try?");
        assert!(prompt.starts_with("You are a compassionate mental health support assistant."));
        assert!(prompt.contains(
            "Knowledge Base:\nBox breathing: in for 4, hold for 4.\n\nGrounding uses the five senses.\n"
        ));
        assert!(prompt.contains(
            "Conversation Context:\nuser: I can't calm down\nassistant: That sounds hard.\n"
        ));
        assert!(prompt.contains("User Message: What can I try?"));
        assert!(prompt.ends_with("immediately provide crisis resources."));
    }

    #[test]
    fn test_prompt_without_hits_or_history() {
        let prompt = build_grounding_prompt(&[], &[], "hello");
        assert!(prompt.contains("Knowledge Base:\n\n\nConversation Context:\n\n\nUser Message: hello"));
    }
}
