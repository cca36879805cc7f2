//! Interactive terminal session: one prompt per question until completion.

use anyhow::bail;
use survey_assist_core::RenderedQuestion;
use survey_assist_engine::{Route, SessionState, Step, SurveyService};
use survey_assist_store::SessionStore;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::display;

pub async fn run_survey<St>(service: &SurveyService<St>, participant: &str) -> anyhow::Result<()>
where
    St: SessionStore<SessionState>,
{
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let (token, mut step) = service.start(participant).await?;
    tracing::debug!(token = %token, "session opened");

    loop {
        match step {
            Step::Render(question) => {
                display::print_question(&question);
                let answer = read_answer(&mut input, &question).await?;
                step = match service
                    .save_response(&token, &question.question_name, &answer)
                    .await
                {
                    Ok(next) => next,
                    Err(err) if err.is_client_error() => {
                        eprintln!("  {err}");
                        service.current(&token).await?
                    }
                    Err(err) => return Err(err.into()),
                };
            }
            Step::Redirect(Route::Summary) => {
                let summary = service.summary(&token).await?;
                if summary.enabled {
                    display::print_summary(&summary);
                }
                let completion = service.complete(&token).await?;
                display::print_completion(&completion);
                return Ok(());
            }
            Step::Redirect(Route::ThankYou) => return Ok(()),
        }
    }
}

async fn read_answer(
    input: &mut Lines<BufReader<Stdin>>,
    question: &RenderedQuestion,
) -> anyhow::Result<String> {
    let Some(line) = input.next_line().await? else {
        bail!("input closed before the survey finished");
    };
    Ok(resolve_choice(question, line.trim()))
}

/// A number picks the option at that position; anything else is passed
/// through as typed.
fn resolve_choice(question: &RenderedQuestion, line: &str) -> String {
    line.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| question.response_options.get(i))
        .map(|opt| opt.value.clone())
        .unwrap_or_else(|| line.to_string())
}
