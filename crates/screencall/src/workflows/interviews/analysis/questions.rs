//! Deterministic question/answer extraction from speaker-labelled transcripts.

use std::sync::OnceLock;

use regex::Regex;

use crate::workflows::interviews::domain::QuestionAnswer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speaker {
    Interviewer,
    Candidate,
}

fn speaker_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:\[[^\]]*\]\s*)?(?P<speaker>[A-Za-z][A-Za-z ]{0,24}?)\s*:\s*(?P<text>.*)$")
            .expect("speaker pattern is valid")
    })
}

fn classify(label: &str) -> Option<Speaker> {
    match label.trim().to_ascii_lowercase().as_str() {
        "interviewer" | "agent" | "ai" | "assistant" | "bot" | "recruiter" | "system" => {
            Some(Speaker::Interviewer)
        }
        "candidate" | "user" | "applicant" | "customer" | "human" | "caller" => {
            Some(Speaker::Candidate)
        }
        _ => None,
    }
}

/// Split a transcript into `(speaker, text)` turns, one per labelled line. Unlabelled lines
/// continue the previous turn.
fn turns(transcript: &str) -> Vec<(Speaker, String)> {
    let mut turns: Vec<(Speaker, String)> = Vec::new();

    for line in transcript.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let labelled = speaker_line().captures(line).and_then(|caps| {
            let speaker = classify(caps.name("speaker")?.as_str())?;
            let text = caps.name("text").map(|m| m.as_str().trim()).unwrap_or_default();
            Some((speaker, text.to_string()))
        });

        match labelled {
            Some(turn) => turns.push(turn),
            None => {
                if let Some((_, buffer)) = turns.last_mut() {
                    append(buffer, line);
                }
            }
        }
    }

    turns
}

fn append(buffer: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text);
}

/// Pull the last question sentence out of an interviewer turn.
fn question_in(turn: &str) -> Option<String> {
    let end = turn.rfind('?')?;
    let head = &turn[..=end];
    let start = head[..end]
        .rfind(['.', '!', '?'])
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let question = head[start..].trim();
    (!question.is_empty()).then(|| question.to_string())
}

/// Derive question/answer pairs by pairing each interviewer question with the candidate turns
/// that follow it.
pub fn extract_from_transcript(transcript: &str) -> Vec<QuestionAnswer> {
    let mut pairs = Vec::new();
    let mut pending: Option<QuestionAnswer> = None;

    for (speaker, text) in turns(transcript) {
        match speaker {
            Speaker::Interviewer => {
                if let Some(question) = question_in(&text) {
                    pairs.extend(pending.take());
                    pending = Some(QuestionAnswer::unanswered(question));
                }
            }
            Speaker::Candidate => {
                if let Some(open) = pending.as_mut() {
                    let answer = open.answer.get_or_insert_with(String::new);
                    append(answer, &text);
                }
            }
        }
    }

    pairs.extend(pending);
    pairs
        .into_iter()
        .map(|mut pair| {
            pair.answer = pair.answer.filter(|answer| !answer.is_empty());
            pair
        })
        .collect()
}
