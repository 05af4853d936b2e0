use std::{
    borrow::Cow,
    collections::HashMap,
    io::Write,
    process::{Command, Stdio},
};

use crate::{
    pipeline::PipelineError,
    pronounce::{split_markup, MarkupPart},
};

/// espeak-ng voice for a single-letter Kokoro language code.
pub fn espeak_voice(lang_code: &str) -> Option<&'static str> {
    let voice = match lang_code {
        "a" => "en-us",
        "b" => "en-gb",
        "e" => "es",
        "f" => "fr-fr",
        "h" => "hi",
        "i" => "it",
        "j" => "ja",
        "p" => "pt-br",
        "z" => "cmn",
        _ => return None,
    };
    Some(voice)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TextPart {
    Text(String),
    Punct(char),
    Ipa(String),
}

/// Split text into sentences, never breaking inside a phoneme hint.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for part in split_markup(text) {
        match part {
            MarkupPart::Phonemes { graphemes, ipa } => {
                current.push_str(&format!("[{graphemes}](/{ipa}/)"));
            }
            MarkupPart::Text(t) => {
                let chars: Vec<char> = t.chars().collect();
                for (i, &ch) in chars.iter().enumerate() {
                    if ch == '\n' || ch == '\r' {
                        flush_sentence(&mut sentences, &mut current);
                        continue;
                    }
                    current.push(ch);
                    let ends = matches!(ch, '.' | '!' | '?')
                        && chars.get(i + 1).map_or(true, |c| c.is_whitespace());
                    if ends {
                        flush_sentence(&mut sentences, &mut current);
                    }
                }
            }
        }
    }
    flush_sentence(&mut sentences, &mut current);
    sentences
}

fn flush_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

pub(crate) fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    for markup in split_markup(text) {
        match markup {
            MarkupPart::Phonemes { ipa, .. } => parts.push(TextPart::Ipa(ipa)),
            MarkupPart::Text(t) => split_plain(&t, &mut parts),
        }
    }
    parts
}

fn split_plain(text: &str, parts: &mut Vec<TextPart>) {
    let mut current = String::new();
    for (idx, ch) in text.char_indices() {
        if is_boundary_punct(ch) && !is_between_digits(text, idx, ch) {
            flush_text(parts, &mut current);
            parts.push(TextPart::Punct(ch));
            continue;
        }
        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }
        current.push(ch);
    }
    flush_text(parts, &mut current);
}

fn flush_text(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Text(trimmed.to_string()));
    }
    current.clear();
}

fn is_boundary_punct(ch: char) -> bool {
    matches!(
        ch,
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}' | '\u{201d}'
    )
}

// "2.5" and "1,000" stay inside the text run
fn is_between_digits(text: &str, idx: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();
    matches!((prev, next), (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit())
}

/// Phonemize each sentence, batching every plain-text run into one espeak-ng call.
pub(crate) fn phonemize_sentences(
    sentences: &[String],
    voice: &str,
) -> Result<Vec<String>, PipelineError> {
    let parsed: Vec<Vec<TextPart>> = sentences.iter().map(|s| split_text_parts(s)).collect();
    let runs: Vec<&str> = parsed
        .iter()
        .flatten()
        .filter_map(|p| match p {
            TextPart::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();

    let ipa_runs = if runs.is_empty() {
        Vec::new()
    } else {
        phonemize_runs(&runs, voice)?
    };

    let mut ipa_iter = ipa_runs.into_iter();
    let mut out = Vec::with_capacity(parsed.len());
    for parts in parsed {
        out.push(join_parts(parts, &mut ipa_iter));
    }
    Ok(out)
}

fn join_parts(parts: Vec<TextPart>, ipa_runs: &mut impl Iterator<Item = String>) -> String {
    let mut phonemes = String::new();
    for part in parts {
        let word = match part {
            TextPart::Punct(ch) => {
                phonemes.push(ch);
                continue;
            }
            TextPart::Ipa(ipa) => ipa,
            TextPart::Text(_) => ipa_runs.next().unwrap_or_default(),
        };
        if word.is_empty() {
            continue;
        }
        if !phonemes.is_empty() && !phonemes.ends_with(' ') {
            phonemes.push(' ');
        }
        phonemes.push_str(&word);
    }
    phonemes
}

fn phonemize_runs(runs: &[&str], voice: &str) -> Result<Vec<String>, PipelineError> {
    let output = run_espeak(&runs.join("\n"), voice)?;
    let lines: Vec<&str> = output.lines().collect();

    // One output line per input line; otherwise fall back to one call per run.
    if lines.len() != runs.len() {
        return runs
            .iter()
            .map(|run| run_espeak(run, voice).map(|o| clean_ipa(&o)))
            .collect();
    }
    Ok(lines.into_iter().map(clean_ipa).collect())
}

fn clean_ipa(raw: &str) -> String {
    raw.lines()
        .map(|l| l.trim().replace('_', ""))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn run_espeak(input: &str, voice: &str) -> Result<String, PipelineError> {
    let mut child = Command::new("espeak-ng")
        .args(["--ipa", "--stdin", "-q", "-v", voice])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Phonemizer("espeak-ng not found on PATH".to_string())
            } else {
                PipelineError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // espeak-ng under-processes a final line with no terminator
        stdin.write_all(newline_terminated(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(PipelineError::Phonemizer(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// Map phoneme characters to model token ids; unknown characters are dropped.
pub(crate) fn tokenize(phonemes: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    phonemes.chars().filter_map(|c| vocab.get(&c).copied()).collect()
}
