use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use rubric_tutor::assessment::{
    AssessmentFlow, AssessmentRouteState, InputKind, PhasePresentation, PhaseStatus,
    SessionRegistry, TranscriptView, assessment_routes,
};
use rubric_tutor::config::{AssessmentConfig, EnvSettings};
use rubric_tutor::llm::{LlmConfig, create_provider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let env = EnvSettings::from_env()
        .context("export OPENAI_API_KEY=sk-... (or RUBRIC_TUTOR_BACKEND=anthropic with ANTHROPIC_API_KEY) to run")?;
    let config = AssessmentConfig::load(Path::new(&env.config_path))
        .with_context(|| format!("failed to load assessment from {}", env.config_path))?;
    let model = env.model.clone().unwrap_or_else(|| config.assistant.model.clone());
    let llm = create_provider(&LlmConfig {
        backend: env.backend,
        api_key: env.api_key.clone(),
        model,
    })?;

    match env.http_port {
        Some(port) => {
            let (sessions, _presentation) = config.build_sessions(llm)?;
            serve(sessions, port, config.scoring_debug_mode).await
        }
        None => {
            let (flow, presentation) = config.build_flow(llm).await?;
            run_terminal(flow, &config, &presentation).await
        }
    }
}

async fn serve(sessions: SessionRegistry, port: u16, debug: bool) -> anyhow::Result<()> {
    let app = assessment_routes(AssessmentRouteState {
        sessions: Arc::new(sessions),
        debug,
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    eprintln!("   Assessment API: http://0.0.0.0:{port}/api/assessment/sessions");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_terminal(
    mut flow: AssessmentFlow,
    config: &AssessmentConfig,
    presentation: &[PhasePresentation],
) -> anyhow::Result<()> {
    tracing::debug!(thread = %flow.thread().thread_id, "Terminal session started");
    eprintln!("📝 {}\n", config.title);
    if !config.intro.is_empty() {
        eprintln!("{}\n", config.intro.trim());
    }
    if let Some(how) = &config.how_it_works {
        eprintln!("How this works:\n{}\n", how.trim());
    }
    eprintln!("   Type /skip to skip a phase (where allowed), /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    loop {
        let view = flow.render(config.scoring_debug_mode);
        print_new_entries(&view, &mut shown);

        if let Some(message) = &view.completion_message {
            println!("\n🎉 {message}");
            return Ok(());
        }

        let index = view.current_phase_index;
        let active = &view.phases[index];
        let kind = presentation.get(index).map(|p| p.kind).unwrap_or_default();
        println!("\n{}", active.prompt_text);
        if !active.input_value.is_empty() {
            println!("(press Enter on an empty answer to submit: {})", active.input_value);
        }

        let Some(answer) = read_answer(&mut lines, kind).await? else {
            return Ok(());
        };
        let result = match answer.trim() {
            "/quit" => return Ok(()),
            "/skip" => flow.skip(index, &active.input_value),
            "" => {
                let text = active.input_value.clone();
                flow.submit(index, &text).await
            }
            _ => flow.submit(index, &answer).await,
        };

        match result {
            Ok(outcome) => {
                println!("\n🤖 {}", outcome.ai_response);
                if let PhaseStatus::BelowThreshold { .. } = outcome.status {
                    eprintln!("⚠️  You haven't passed. Please revise your answer and try again.");
                }
                // Feedback for this phase was just printed.
                if outcome.passed() {
                    shown = shown.max(index + 1);
                }
            }
            Err(e) => eprintln!("❌ {e}"),
        }
    }
}

/// Print locked phases that have not been printed yet.
fn print_new_entries(view: &TranscriptView, shown: &mut usize) {
    for phase in view.phases.iter().skip(*shown).filter(|p| p.locked) {
        println!("\n{}\n> {}", phase.prompt_text, phase.input_value);
        if let Some(feedback) = &phase.ai_feedback {
            println!("🤖 {feedback}");
        }
        if let Some(result) = &phase.scoring_result {
            println!("🤖 SCORE (DEBUG MODE): {result}");
        }
        *shown = phase.index + 1;
    }
}

/// One line for single-line inputs; lines up to a lone `.` for text areas.
async fn read_answer(
    lines: &mut Lines<BufReader<Stdin>>,
    kind: InputKind,
) -> anyhow::Result<Option<String>> {
    match kind {
        InputKind::TextInput => {
            eprint!("> ");
            Ok(lines.next_line().await?)
        }
        InputKind::TextArea => {
            eprintln!("(finish with a line containing only '.')");
            let mut collected = Vec::new();
            loop {
                match lines.next_line().await? {
                    None if collected.is_empty() => return Ok(None),
                    None => break,
                    Some(line) if line.trim() == "." => break,
                    Some(line) if collected.is_empty() && line.trim().starts_with('/') => {
                        return Ok(Some(line));
                    }
                    Some(line) => collected.push(line),
                }
            }
            Ok(Some(collected.join("\n")))
        }
    }
}
