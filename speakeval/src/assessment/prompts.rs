//! Examiner prompts.

use super::Section;
use std::fmt::Write;

/// System prompt for one section.
#[must_use]
pub fn section_system(section: Section) -> String {
    format!(
        "You are an expert IELTS Speaking examiner specializing in {}.",
        section.focus()
    )
}

/// User prompt for one section.
///
/// Timing lines are included only for sections that read the duration.
#[must_use]
pub fn section_user(section: Section, transcript: &str, duration: f64, wpm: f64) -> String {
    let mut prompt = format!(
        "Analyze the following transcript for {}.\n\nTranscript: {transcript}\n",
        section.focus()
    );
    if section.uses_timing() {
        let _ = writeln!(prompt, "Duration: {duration:.2} seconds");
        let _ = writeln!(prompt, "Speaking Rate: {wpm:.2} Words Per Minute (WPM)");
    }

    let _ = write!(
        prompt,
        "\nProvide a structured assessment including:\n\
         1. score (0-9): {} score based on IELTS criteria\n\
         2. evaluation: List of evaluation details with criteria (e.g., 'Strengths', 'Weaknesses', 'Improvements') and detailed descriptions\n\
         3. errors: {}, each with:\n   \
            - original: The problematic text\n   \
            - suggested: The improved version\n   \
            - explanation: Why this is an issue\n\
         4. feedback: Overall feedback on {}\n",
        section.focus(),
        section.error_hint(),
        section.focus().to_lowercase(),
    );
    if section.emits_wpm() {
        let _ = writeln!(prompt, "5. wpm: {wpm:.2} (use this exact value)");
    }
    prompt
}

/// System prompt for the aggregation call.
pub const FEEDBACK_SYSTEM: &str = "You are a senior IELTS Speaking Examiner. \
     Your task is to provide a final score and comprehensive feedback report.";

/// User prompt for the aggregation call.
///
/// Sections without an analysis are listed as unavailable.
#[must_use]
pub fn feedback_user(transcript: &str, sections: &[(Section, Option<&serde_json::Value>)]) -> String {
    let mut prompt = format!(
        "Based on the following analyses, provide a final IELTS Speaking Report.\n\nTranscript: {transcript}\n"
    );
    for (section, analysis) in sections {
        let body = analysis.map_or_else(|| "Not available.".to_string(), ToString::to_string);
        let _ = write!(prompt, "\n---\n{} Analysis:\n{body}\n", section.title());
    }
    prompt.push_str(
        "\n---\n\nProvide a structured output including:\n\
         1. overall_score (0-9): The overall IELTS band score, weighing every available section\n\
         2. general_suggestions: List of general improvement suggestions\n",
    );
    prompt
}
