//! Pronunciation overrides.
//!
//! Kokoro accepts inline phoneme hints written as `[word](/ipa/)`. A
//! [`Lexicon`] rewrites known words into that form before synthesis, and
//! [`split_markup`] takes the annotated text apart again for a backend.

use anyhow::bail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    entries: Vec<(String, String)>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            entries: vec![("AIRA".to_string(), "ˈaɪrə".to_string())],
        }
    }
}

impl Lexicon {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Parse `WORD=ipa;OTHER=ipa` into a lexicon, keeping entry order.
    pub fn parse(spec: &str) -> anyhow::Result<Self> {
        let mut entries = Vec::new();
        for raw in spec.split(';') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let Some((word, ipa)) = raw.split_once('=') else {
                bail!("pronunciation entry '{raw}' is missing '='");
            };
            let (word, ipa) = (word.trim(), ipa.trim().trim_matches('/'));
            if word.is_empty() || ipa.is_empty() {
                bail!("pronunciation entry '{raw}' needs both a word and its IPA");
            }
            entries.push((word.to_string(), ipa.to_string()));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite every occurrence of a known word as `[word](/ipa/)`.
    ///
    /// Matching is plain substring replacement, case sensitive.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (word, ipa) in &self.entries {
            out = out.replace(word.as_str(), &format!("[{word}](/{ipa}/)"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupPart {
    Text(String),
    Phonemes { graphemes: String, ipa: String },
}

/// Split text into plain runs and `[graphemes](/ipa/)` hints.
///
/// Anything that does not form a complete hint stays in the surrounding text.
pub fn split_markup(text: &str) -> Vec<MarkupPart> {
    let mut parts = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        match parse_hint(&rest[open..]) {
            Some((graphemes, ipa, consumed)) => {
                plain.push_str(&rest[..open]);
                if !plain.is_empty() {
                    parts.push(MarkupPart::Text(std::mem::take(&mut plain)));
                }
                parts.push(MarkupPart::Phonemes {
                    graphemes: graphemes.to_string(),
                    ipa: ipa.to_string(),
                });
                rest = &rest[open + consumed..];
            }
            None => {
                plain.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
            }
        }
    }
    plain.push_str(rest);
    if !plain.is_empty() {
        parts.push(MarkupPart::Text(plain));
    }
    parts
}

/// Parse a hint at the start of `s`, returning its pieces and byte length.
fn parse_hint(s: &str) -> Option<(&str, &str, usize)> {
    let close = s.find(']')?;
    let graphemes = &s[1..close];
    if graphemes.is_empty() || graphemes.contains('[') {
        return None;
    }
    let after = &s[close + 1..];
    let body = after.strip_prefix("(/")?;
    let end = body.find("/)")?;
    let ipa = &body[..end];
    if ipa.is_empty() {
        return None;
    }
    // "[" + graphemes + "]" + "(/" + ipa + "/)"
    let consumed = close + 1 + 2 + end + 2;
    Some((graphemes, ipa, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lexicon_marks_aira() {
        let text = Lexicon::default().apply("My name is AIRA, your AI interviewer.");
        assert_eq!(text, "My name is [AIRA](/ˈaɪrə/), your AI interviewer.");
    }

    #[test]
    fn test_apply_is_case_sensitive_substring() {
        let lexicon = Lexicon::default();
        assert_eq!(lexicon.apply("aira"), "aira");
        assert_eq!(lexicon.apply("AIRAs"), "[AIRA](/ˈaɪrə/)s");
    }

    #[test]
    fn test_parse_lexicon() {
        let lexicon = Lexicon::parse("AIRA=ˈaɪrə; Kokoro=/kˈOkəɹO/ ;").unwrap();
        assert_eq!(
            lexicon.entries(),
            &[
                ("AIRA".to_string(), "ˈaɪrə".to_string()),
                ("Kokoro".to_string(), "kˈOkəɹO".to_string()),
            ]
        );
        assert!(Lexicon::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_lexicon_rejects_malformed() {
        assert!(Lexicon::parse("AIRA").is_err());
        assert!(Lexicon::parse("=ˈaɪrə").is_err());
        assert!(Lexicon::parse("AIRA=").is_err());
    }

    #[test]
    fn test_split_markup() {
        let parts = split_markup("Hi, I'm [AIRA](/ˈaɪrə/), nice to meet you.");
        assert_eq!(
            parts,
            vec![
                MarkupPart::Text("Hi, I'm ".to_string()),
                MarkupPart::Phonemes {
                    graphemes: "AIRA".to_string(),
                    ipa: "ˈaɪrə".to_string(),
                },
                MarkupPart::Text(", nice to meet you.".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_markup_keeps_malformed_hints_as_text() {
        let text = "Array [0] and [AIRA](ˈaɪrə) and [x](/";
        assert_eq!(split_markup(text), vec![MarkupPart::Text(text.to_string())]);
    }

    #[test]
    fn test_split_markup_hint_only() {
        assert_eq!(
            split_markup("[AIRA](/ˈaɪrə/)"),
            vec![MarkupPart::Phonemes {
                graphemes: "AIRA".to_string(),
                ipa: "ˈaɪrə".to_string(),
            }]
        );
        assert!(split_markup("").is_empty());
    }
}
