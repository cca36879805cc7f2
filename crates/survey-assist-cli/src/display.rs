//! Terminal rendering for questions, summaries and service responses.

use survey_assist_ai::FollowUpQuestionSpec;
use survey_assist_core::{
    ClassificationResult, Flavour, LookupResponse, QuestionCatalog, RenderedQuestion,
    SurveyConfig,
};
use survey_assist_engine::{Completion, SummaryView};

const MAX_LIST_ITEMS: usize = 10;

// ── Survey flow ──

pub fn print_question(question: &RenderedQuestion) {
    println!();
    if question.assisted {
        println!("[{}]", question.title);
    }
    println!("{}", question.question_text);
    if !question.question_description.is_empty() {
        println!("  {}", question.question_description);
    }
    for (i, opt) in question.response_options.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, opt.label);
    }
    if let Some(limit) = question.char_limit {
        println!("  (up to {limit} characters)");
    }
    print!("> ");
    // Prompt only; a failed flush just delays it.
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

pub fn print_summary(view: &SummaryView) {
    println!();
    println!("=== Summary ===");
    for q in &view.questions {
        println!("  {:<50} {}", strip_markup(&q.question_text), q.response.as_deref().unwrap_or("-"));
    }
}

pub fn print_completion(done: &Completion) {
    println!();
    if done.rerouted {
        println!("Thank you. You do not need to answer any more questions.");
    } else {
        println!("Thank you for completing the survey.");
    }
    match &done.result_id {
        Some(id) => println!("  result id: {id}"),
        None => println!("  result was not stored"),
    }
}

// ── Service responses ──

pub fn print_lookup(flavour: Flavour, description: &str, response: &LookupResponse) {
    println!("=== {flavour} lookup: {description} ===");
    println!("  {:<26} {}", "found", response.found);
    if let Some(code) = &response.code {
        println!("  {:<26} {}", "code", code);
    }
    if let Some(division) = &response.code_division {
        println!("  {:<26} {}", "code_division", division);
    }
    println!("  {:<26} {}", "potential_codes_count", response.potential_codes_count);

    let codes: Vec<&str> = response.potential_codes.iter().map(|c| c.code.as_str()).collect();
    print_list("potential_codes", &codes);
    let divisions: Vec<String> = response
        .potential_divisions
        .iter()
        .map(|d| format!("{} {}", d.code, d.title))
        .collect();
    let divisions: Vec<&str> = divisions.iter().map(String::as_str).collect();
    print_list("potential_divisions", &divisions);
}

pub fn print_classification(result: &ClassificationResult, specs: &[FollowUpQuestionSpec]) {
    println!("=== {} classification ===", result.flavour);
    println!("  {:<26} {}", "classified", result.classified);
    if let Some(code) = &result.code {
        println!("  {:<26} {}", "code", code);
    }
    if let Some(description) = &result.description {
        println!("  {:<26} {}", "description", description);
    }
    if !result.reasoning.is_empty() {
        println!("  {:<26} {}", "reasoning", result.reasoning);
    }
    for c in &result.candidates {
        println!("  {:<26} {} ({:.2}) {}", "candidate", c.code, c.likelihood, c.descriptive);
    }

    if specs.is_empty() {
        return;
    }
    println!();
    println!("Follow-up questions");
    for spec in specs {
        println!("  {} [{:?}] {}", spec.id, spec.kind, spec.question_text);
        for opt in &spec.select_options {
            println!("      - {opt}");
        }
    }
}

pub fn print_catalog(catalog: &QuestionCatalog, config: &SurveyConfig) {
    println!("=== Catalog: {} questions ===", catalog.len());
    for q in catalog.iter() {
        let trigger = config
            .interaction_after(&q.question_id)
            .map(|(i, interaction)| format!("  -> interaction {i} ({} {})", interaction.kind, interaction.param))
            .unwrap_or_default();
        println!(
            "  {:<6} {:<32} {:<9}{}",
            q.question_id,
            q.question_name,
            q.response_type.as_str(),
            trigger
        );
    }
}

// ── Helpers ──

fn print_list(label: &str, items: &[&str]) {
    if items.is_empty() {
        return;
    }
    let shown: Vec<&str> = items.iter().take(MAX_LIST_ITEMS).copied().collect();
    let more = items.len().saturating_sub(MAX_LIST_ITEMS);
    if more > 0 {
        println!("  {:<26} {} … (+{more} more)", label, shown.join(", "));
    } else {
        println!("  {:<26} {}", label, shown.join(", "));
    }
}

/// Drop HTML tags from configured labels.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_assist_label_markup() {
        assert_eq!(
            strip_markup("Tell us more<br><strong>(Asked by Survey Assist)</strong>"),
            "Tell us more(Asked by Survey Assist)"
        );
        assert_eq!(strip_markup("a > b"), "a > b");
    }
}
