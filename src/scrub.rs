//! PII scrubbing applied by the CLI before a transcript enters the pipeline.
//!
//! The pipeline never scrubs; callers decide. Patterns cover phone numbers,
//! e-mail addresses and honorific + surname pairs.
use regex::Regex;
use std::sync::OnceLock;

pub const PHONE_REDACTED: &str = "[PHONE_REDACTED]";
pub const EMAIL_REDACTED: &str = "[EMAIL_REDACTED]";
pub const NAME_REDACTED: &str = "[NAME_REDACTED]";

struct Patterns {
    phone: Regex,
    email: Regex,
    name: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        phone: compile(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}"),
        email: compile(r"\b[\w.-]+@[\w.-]+\.\w+\b"),
        name: compile(r"(Dr\.|Mr\.|Mrs\.|Ms\.)\s+[A-Z][a-z]+"),
    })
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static scrub pattern compiles")
}

/// Replace phone numbers, e-mail addresses and titled names.
pub fn scrub_pii(text: &str) -> String {
    let patterns = patterns();
    let text = patterns.phone.replace_all(text, PHONE_REDACTED);
    let text = patterns.email.replace_all(&text, EMAIL_REDACTED);
    let text = patterns
        .name
        .replace_all(&text, format!("${{1}} {NAME_REDACTED}").as_str());
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_phone_numbers() {
        assert_eq!(
            scrub_pii("Call me at (555) 123-4567 or 555.987.6543"),
            "Call me at [PHONE_REDACTED] or [PHONE_REDACTED]"
        );
    }

    #[test]
    fn redacts_email_addresses() {
        assert_eq!(
            scrub_pii("Mail jane.doe@clinic.example.org today"),
            "Mail [EMAIL_REDACTED] today"
        );
    }

    #[test]
    fn redacts_titled_names_keeping_the_title() {
        assert_eq!(
            scrub_pii("I saw Dr. Smith and Mrs. Jones yesterday."),
            "I saw Dr. [NAME_REDACTED] and Mrs. [NAME_REDACTED] yesterday."
        );
    }

    #[test]
    fn leaves_clinical_text_alone() {
        let text = "Patient: I have chest pain for 2 days.\n\nDoctor: Let's run an EKG.";
        assert_eq!(scrub_pii(text), text);
    }
}
