//! Prompt assembly.
//!
//! Folds conversation history and retrieved context into the ordered message
//! list handed to a provider adapter. History is truncated to the most
//! recent turns; retrieved snippets are stitched into a single grounding
//! preamble ahead of the user's question.

use crate::types::Message;

/// Builds the provider-facing message list for one request.
#[derive(Debug, Clone, Copy)]
pub struct ConversationAssembler {
    history_window: usize,
}

impl ConversationAssembler {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Wrap `prompt` with retrieved context. With no snippets the prompt
    /// passes through untouched.
    pub fn augment_prompt(&self, prompt: &str, snippets: &[String]) -> String {
        if snippets.is_empty() {
            return prompt.to_string();
        }
        let context = snippets.join("\n\n");
        format!(
            "Context from knowledge base:\n{context}\n\nUser question: {prompt}\n\n\
             Please answer the user's question using the provided context when relevant."
        )
    }

    /// The ordered message list: the most recent history turns, then the
    /// (possibly augmented) user prompt.
    pub fn assemble(&self, history: &[Message], prompt: &str, snippets: &[String]) -> Vec<Message> {
        let start = history.len().saturating_sub(self.history_window);
        let mut messages: Vec<Message> = history[start..].to_vec();
        messages.push(Message::user(self.augment_prompt(prompt, snippets)));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    #[test]
    fn no_context_passes_the_prompt_through() {
        let assembler = ConversationAssembler::new(20);
        assert_eq!(assembler.augment_prompt("what is rust?", &[]), "what is rust?");
    }

    #[test]
    fn context_is_stitched_ahead_of_the_question() {
        let assembler = ConversationAssembler::new(20);
        let snippets = vec!["first snippet".to_string(), "second snippet".to_string()];
        let augmented = assembler.augment_prompt("what is rust?", &snippets);
        assert_eq!(
            augmented,
            "Context from knowledge base:\nfirst snippet\n\nsecond snippet\n\n\
             User question: what is rust?\n\n\
             Please answer the user's question using the provided context when relevant."
        );
    }

    #[test]
    fn history_is_truncated_to_the_most_recent_turns() {
        let assembler = ConversationAssembler::new(2);
        let history = vec![
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
            Message::assistant("four"),
        ];

        let messages = assembler.assemble(&history, "five", &[]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "three");
        assert_eq!(messages[1].content, "four");
        assert_eq!(messages[2].content, "five");
        assert_eq!(messages[2].role, MessageRole::User);
    }

    #[test]
    fn empty_history_yields_just_the_prompt() {
        let assembler = ConversationAssembler::new(20);
        let messages = assembler.assemble(&[], "hello", &[]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }
}
