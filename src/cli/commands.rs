//! `forge generate` and `forge config`

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use forge_config::Config;
use forge_engine::{Branch, GenerationOutcome, GenerationRequest, Orchestrator};
use forge_llm::InlineImage;
use forge_utils::exit_codes::ExitCode;
use forge_utils::types::DocumentId;

use super::progress::ProgressPrinter;

/// Print every effective configuration key with its source.
pub(crate) fn execute_config_command(config: &Config, json: bool) -> Result<ExitCode> {
    let effective = config.effective_config();
    if json {
        let entries: serde_json::Map<String, serde_json::Value> = effective
            .into_iter()
            .map(|(key, (value, source))| (key, json!({ "value": value, "source": source })))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (key, (value, source)) in &effective {
            println!("{key:<26} {value:<44} [{source}]");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Options for one `forge generate` run.
#[derive(Debug, Default)]
pub(crate) struct GenerateOptions {
    pub request: Option<String>,
    pub document: String,
    pub branch: Option<String>,
    pub image_base64: Option<PathBuf>,
    pub image_mime: Option<String>,
    pub output: Option<Utf8PathBuf>,
    pub json: bool,
}

pub(crate) async fn execute_generate_command(
    orchestrator: Arc<Orchestrator>,
    options: GenerateOptions,
) -> Result<ExitCode> {
    let request = build_request(&options).await?;
    let document = DocumentId::from(options.document.as_str());
    if !orchestrator.contains(&document) {
        orchestrator.create_document(document.clone(), options.document.clone())?;
    }

    let progress = spawn_progress(&orchestrator, document.clone());
    let mut task = {
        let orchestrator = Arc::clone(&orchestrator);
        let document = document.clone();
        tokio::spawn(async move { orchestrator.submit(&document, request).await })
    };

    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            orchestrator.cancel(&document)?;
            task.await
        }
    };
    let outcome = joined.context("generation task panicked")??;
    progress.abort();

    if options.json {
        let snapshot = orchestrator.snapshot(&document)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "outcome": outcome, "document": snapshot }))?
        );
    }

    match outcome {
        GenerationOutcome::Committed { version } => {
            if let Some(path) = &options.output {
                orchestrator.export(&document, path)?;
                eprintln!("Version {version} written to {path}");
            } else if !options.json {
                println!("{}", orchestrator.snapshot(&document)?.current_artifact.code);
            }
            Ok(ExitCode::SUCCESS)
        }
        GenerationOutcome::Cancelled | GenerationOutcome::Superseded => {
            eprintln!("Generation cancelled; nothing was committed.");
            Ok(ExitCode::INTERRUPTED)
        }
        GenerationOutcome::Failed { message } => {
            eprintln!("Generation failed: {message}");
            Ok(ExitCode::GENERATION_FAILED)
        }
    }
}

async fn build_request(options: &GenerateOptions) -> Result<GenerationRequest> {
    let text = match &options.request {
        Some(text) => text.clone(),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read the request from stdin")?;
            text
        }
    };

    let mut request = GenerationRequest::new(text);
    if let Some(branch) = &options.branch {
        request = request.with_branch(branch.parse::<Branch>()?);
    }
    if let (Some(path), Some(mime)) = (&options.image_base64, &options.image_mime) {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read image from {}", path.display()))?;
        request = request.with_image(InlineImage {
            mime_type: mime.clone(),
            data: data.split_whitespace().collect(),
        });
    }
    Ok(request)
}

/// Echo progress for `document` to stderr until aborted.
fn spawn_progress(orchestrator: &Orchestrator, document: DocumentId) -> JoinHandle<()> {
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        let mut printer = ProgressPrinter::default();
        loop {
            match events.recv().await {
                Ok(event) if event.document_id() == &document => {
                    if let Some(line) = printer.line(&event) {
                        eprintln!("{line}");
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}
