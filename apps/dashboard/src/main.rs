use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    forms, presenter::field_error_lines, AlertPresenter, CatalogEntry, CatalogView, FieldValues,
    FormSchema, HttpTransport, ModalPresenter, ResultPresenter, SubmissionController,
    SubmissionState, SubmitError, Transport,
};
use futures::StreamExt;
use shared::domain::{InstanceRecord, ModuleRecord};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Drive the VS-DTIC dashboard forms from a terminal")]
struct Args {
    /// Base URL the form endpoints are resolved against.
    #[arg(long, default_value = "http://127.0.0.1:8080/api")]
    api_url: String,
    #[arg(long, default_value_t = 100)]
    timeout_secs: u64,
    #[arg(long, value_enum, default_value_t = PresenterKind::Modal)]
    presenter: PresenterKind,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PresenterKind {
    Alert,
    Modal,
}

// Form arguments default to empty so that missing input surfaces as field
// errors from the controller instead of clap usage errors.
#[derive(Subcommand, Debug)]
enum Command {
    CreateInstance {
        #[arg(long, default_value_t)]
        instance_name: String,
        #[arg(long, default_value_t)]
        module_name: String,
        #[arg(long, default_value_t)]
        github_url: String,
        #[arg(long, default_value_t)]
        file_name: String,
    },
    UploadModule {
        #[arg(long, default_value_t)]
        module_name: String,
        #[arg(long, default_value_t)]
        module_description: String,
        #[arg(long, default_value_t)]
        github_url: String,
        #[arg(long, default_value_t)]
        module_file_name: String,
        #[arg(long, default_value_t)]
        prediction_file_name: String,
        #[arg(long, default_value_t)]
        requirements_file: String,
        #[arg(long, default_value_t)]
        requirements_file_prediction: String,
    },
    GetVsValue {
        #[arg(long, default_value_t)]
        instance_name: String,
        #[arg(long, default_value_t)]
        github_url: String,
        #[arg(long, default_value_t)]
        file_name: String,
    },
    /// List modules, or look one up by name.
    Modules {
        #[arg(long)]
        name: Option<String>,
    },
    /// List instances, or look one up by name.
    Instances {
        #[arg(long)]
        name: Option<String>,
    },
}

enum Screen {
    Form(FormSchema, FieldValues),
    Modules(Option<String>),
    Instances(Option<String>),
}

impl Command {
    fn into_screen(self) -> Screen {
        match self {
            Command::CreateInstance {
                instance_name,
                module_name,
                github_url,
                file_name,
            } => Screen::Form(
                forms::create_instance(),
                FieldValues::from_iter([
                    ("instance_name", instance_name),
                    ("module_name", module_name),
                    ("github_url", github_url),
                    ("file_name", file_name),
                ]),
            ),
            Command::UploadModule {
                module_name,
                module_description,
                github_url,
                module_file_name,
                prediction_file_name,
                requirements_file,
                requirements_file_prediction,
            } => Screen::Form(
                forms::upload_module(),
                FieldValues::from_iter([
                    ("module_name", module_name),
                    ("module_description", module_description),
                    ("github_url", github_url),
                    ("module_file_name", module_file_name),
                    ("prediction_file_name", prediction_file_name),
                    ("requirements_file", requirements_file),
                    ("requirements_file_prediction", requirements_file_prediction),
                ]),
            ),
            Command::GetVsValue {
                instance_name,
                github_url,
                file_name,
            } => Screen::Form(
                forms::get_vs_value(),
                FieldValues::from_iter([
                    ("instance_name", instance_name),
                    ("github_url", github_url),
                    ("file_name", file_name),
                ]),
            ),
            Command::Modules { name } => Screen::Modules(name),
            Command::Instances { name } => Screen::Instances(name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let args = Args::parse();

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&args.api_url)?);
    let presenter: Arc<dyn ResultPresenter> = match args.presenter {
        PresenterKind::Alert => Arc::new(AlertPresenter),
        PresenterKind::Modal => Arc::new(ModalPresenter),
    };

    match args.command.into_screen() {
        Screen::Form(schema, values) => {
            let timeout = Duration::from_secs(args.timeout_secs);
            submit_form(transport, presenter, schema, values, timeout).await
        }
        Screen::Modules(name) => {
            show_catalog::<ModuleRecord>(transport, name, |m| {
                vec![
                    m.name.clone(),
                    m.status.clone().unwrap_or_default(),
                    m.description.clone().unwrap_or_default(),
                ]
            })
            .await
        }
        Screen::Instances(name) => {
            show_catalog::<InstanceRecord>(transport, name, |i| {
                vec![
                    i.instance_name.clone(),
                    i.module_name.clone(),
                    i.status.clone().unwrap_or_default(),
                    i.container_status.clone().unwrap_or_default(),
                ]
            })
            .await
        }
    }
}

async fn submit_form(
    transport: Arc<dyn Transport>,
    presenter: Arc<dyn ResultPresenter>,
    schema: FormSchema,
    values: FieldValues,
    timeout: Duration,
) -> Result<ExitCode> {
    let schema = Arc::new(schema);
    let controller =
        SubmissionController::new(Arc::clone(&schema), transport).with_timeout(timeout);

    // Terminal states persist until acknowledged, so the render task always
    // observes the outcome before we acknowledge below.
    let mut states = controller.states();
    let form = Arc::clone(&schema);
    let render = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            if let Some(presentation) = presenter.present(&form, &state) {
                println!("{presentation}");
            }
            if state.is_terminal() {
                break;
            }
        }
    });

    let outcome = controller.submit(values).await;
    let code = match &outcome {
        Ok(state) => {
            render.await?;
            if let SubmissionState::Succeeded { payload, .. } = state {
                if !payload.is_null() {
                    println!("{}", serde_json::to_string_pretty(payload)?);
                }
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(SubmitError::Invalid(errors)) => {
            render.abort();
            for line in field_error_lines(&schema, errors) {
                eprintln!("{line}");
            }
            ExitCode::from(2)
        }
        Err(err) => {
            render.abort();
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    };
    controller.acknowledge();
    debug!(form = %schema.name, state = ?controller.state().phase(), "form closed");
    Ok(code)
}

async fn show_catalog<T: CatalogEntry>(
    transport: Arc<dyn Transport>,
    name: Option<String>,
    row: impl Fn(&T) -> Vec<String>,
) -> Result<ExitCode> {
    let view = CatalogView::<T>::new(transport);
    let result = match name.as_deref() {
        Some(term) => view.search(term).await,
        None => view.fetch_all().await,
    };
    let entries = match result {
        Ok(entries) => entries,
        Err(err) => {
            debug!(error = %err, "catalog request failed");
            eprintln!("{}", view.error().unwrap_or_else(|| err.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    };

    for line in render_table(entries.iter().map(row).collect()) {
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Left-aligns every column to its widest cell.
fn render_table(rows: Vec<Vec<String>>) -> Vec<String> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect()
}
