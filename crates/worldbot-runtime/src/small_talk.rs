//! Canned replies for greetings, help requests and thanks.
//!
//! Used only when no knowledge entry qualifies and small talk is enabled.
//! Matching is on whole words, so "this" does not count as "hi".

const GREETINGS: &[&str] = &["hello", "hi", "hey"];
const HELP_WORDS: &[&str] = &["help"];
const HELP_PHRASES: &[&[&str]] = &[&["what", "can", "you", "do"]];
const THANKS: &[&str] = &["thank", "thanks"];

fn words(normalized: &str) -> Vec<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect()
}

fn has_any(words: &[&str], wanted: &[&str]) -> bool {
    words.iter().any(|w| wanted.contains(w))
}

fn has_phrase(words: &[&str], phrase: &[&str]) -> bool {
    words.windows(phrase.len()).any(|window| window == phrase)
}

/// Reply to `normalized` input, if it is small talk.
///
/// `topics` are listed in the help reply.
pub fn reply(normalized: &str, sender_name: &str, topics: &[String]) -> Option<String> {
    let words = words(normalized);
    if has_any(&words, GREETINGS) {
        return Some(format!(
            "Hello {sender_name}! How can I help? Ask me about the places or items here."
        ));
    }
    if has_any(&words, HELP_WORDS) || HELP_PHRASES.iter().any(|p| has_phrase(&words, p)) {
        let known = if topics.is_empty() {
            "any specific topics yet".to_string()
        } else {
            topics.join(", ")
        };
        return Some(format!(
            "I can tell you about: {known}. I also let the owners know when items here are used."
        ));
    }
    if has_any(&words, THANKS) {
        return Some(format!("You're welcome, {sender_name}!"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_personalised() {
        let r = reply("hey there", "Alice", &[]).unwrap();
        assert!(r.starts_with("Hello Alice!"));
    }

    #[test]
    fn greeting_needs_a_whole_word() {
        assert_eq!(reply("this is high", "Alice", &[]), None);
    }

    #[test]
    fn help_lists_topics() {
        let topics = vec!["Cafe".to_string(), "Gallery".to_string()];
        let r = reply("what can you do?", "Bob", &topics).unwrap();
        assert!(r.contains("Cafe, Gallery"));

        let r = reply("help", "Bob", &[]).unwrap();
        assert!(r.contains("any specific topics yet"));
    }

    #[test]
    fn thanks_and_greeting_priority() {
        assert_eq!(
            reply("thanks!", "Cy", &[]).as_deref(),
            Some("You're welcome, Cy!")
        );
        assert!(reply("hi, thanks", "Cy", &[]).unwrap().starts_with("Hello"));
    }
}
