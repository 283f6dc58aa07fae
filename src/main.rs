mod builtin;
mod settings;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use toolflow_config::{ConfigFormat, FlowDefinition};
use toolflow_engine::FlowEngine;
use toolflow_service::{AnalysisRequest, AnalysisResponse, AnalysisService};
use toolflow_store::{FlowConfigManager, FsFlowStore};
use toolflow_tool::{ToolInput, ToolRegistry};

use crate::settings::{Settings, init_logging};

/// Toolflow - run analysis tools as dependency-aware flows
#[derive(Parser)]
#[command(name = "toolflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.toolflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a flow file without running it
  Validate {
    /// Path to the flow file (JSON or YAML)
    flow_file: PathBuf,
  },

  /// Run a flow file against a tool input read from stdin
  Run {
    /// Path to the flow file (JSON or YAML)
    flow_file: PathBuf,
  },

  /// Store a flow file in the data directory
  Import {
    flow_file: PathBuf,

    #[arg(long, default_value = "cli")]
    author: String,
  },

  /// Write a stored flow to a file
  Export {
    flow_id: String,

    /// Destination; the extension selects JSON or YAML
    path: PathBuf,
  },

  /// Show the change history of a stored flow
  History { flow_id: String },

  /// List stored flows and templates
  List,

  /// Analyze a request read from stdin
  Analyze {
    /// Template to run, overriding the request
    #[arg(long)]
    analysis_type: Option<String>,

    /// Stored flow to run, overriding the request
    #[arg(long)]
    flow: Option<String>,
  },
}

/// Everything the commands need, built from the data directory.
struct App {
  settings: Settings,
  registry: Arc<ToolRegistry>,
  flows: Arc<FlowConfigManager<FsFlowStore>>,
}

impl App {
  async fn open(data_dir: &Path) -> Result<Self> {
    let settings = Settings::load(&data_dir.join("config.toml"))?;
    init_logging(&settings.log_level);

    let registry = Arc::new(ToolRegistry::new());
    builtin::register(&registry, &settings.tools).context("failed to register tools")?;

    let flows = Arc::new(FlowConfigManager::new(
      FsFlowStore::new(data_dir),
      registry.clone(),
      settings.store.clone(),
    ));
    builtin::seed_templates(&flows)
      .await
      .context("failed to seed templates")?;

    Ok(Self {
      settings,
      registry,
      flows,
    })
  }

  fn engine(&self) -> Result<FlowEngine> {
    FlowEngine::new(self.registry.clone(), self.settings.engine_config())
      .context("failed to create flow engine")
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".toolflow"),
  };

  let Some(command) = cli.command else {
    println!("toolflow - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let app = App::open(&data_dir).await?;
    run(app, command).await
  })
}

async fn run(app: App, command: Commands) -> Result<()> {
  match command {
    Commands::Validate { flow_file } => {
      let flow = read_flow(&flow_file).await?;
      let report = app.flows.validate(&flow);
      for warning in &report.warnings {
        eprintln!("warning: {warning}");
      }
      if !report.valid {
        for error in &report.errors {
          eprintln!("error: {error}");
        }
        bail!("flow '{}' is invalid", flow.flow_id);
      }
      eprintln!("Flow '{}' is valid", flow.flow_id);
    }

    Commands::Run { flow_file } => {
      let flow = read_flow(&flow_file).await?;
      let input: ToolInput = read_payload_from_stdin()?;
      let engine = app.engine()?;

      let cancel = CancellationToken::new();
      cancel_on_ctrl_c(cancel.clone());
      let result = engine
        .execute(&flow, input, cancel)
        .await
        .context("flow execution failed")?;

      eprintln!(
        "Execution {} finished: success={}, {} succeeded, {} failed",
        result.execution_id,
        result.success,
        result.successful_tools.len(),
        result.failed_tools.len()
      );
      println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Commands::Import { flow_file, author } => {
      let doc = app
        .flows
        .import(&flow_file, &author)
        .await
        .with_context(|| format!("failed to import {}", flow_file.display()))?;
      eprintln!("Imported flow '{}' (version {})", doc.flow.flow_id, doc.metadata.version);
    }

    Commands::Export { flow_id, path } => {
      app.flows.export(&flow_id, &path).await?;
      eprintln!("Exported flow '{}' to {}", flow_id, path.display());
    }

    Commands::History { flow_id } => {
      let history = app.flows.history(&flow_id).await?;
      println!("{}", serde_json::to_string_pretty(&history)?);
    }

    Commands::List => {
      let flows = app.flows.list().await?;
      let templates: Vec<_> = app
        .flows
        .list_templates()
        .await?
        .into_iter()
        .map(|t| serde_json::json!({ "name": t.name, "description": t.description, "usage_count": t.usage_count }))
        .collect();
      println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "flows": flows, "templates": templates }))?
      );
    }

    Commands::Analyze { analysis_type, flow } => {
      let mut request: AnalysisRequest = read_payload_from_stdin()?;
      if analysis_type.is_some() {
        request.analysis_type = analysis_type;
      }
      if flow.is_some() {
        request.custom_flow_id = flow;
      }

      let engine = Arc::new(app.engine()?);
      let service = AnalysisService::new(engine, app.flows.clone(), app.settings.service.clone());

      let cancel = CancellationToken::new();
      cancel_on_ctrl_c(cancel.clone());
      let result = service.get_or_execute(&request, cancel).await?;

      println!(
        "{}",
        serde_json::to_string_pretty(&AnalysisResponse::from_result(&result))?
      );
    }
  }

  Ok(())
}

/// Parse a flow file, ignoring any saved metadata.
async fn read_flow(path: &Path) -> Result<FlowDefinition> {
  let format = ConfigFormat::from_path(path)?;
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read flow file: {}", path.display()))?;
  format
    .parse(&content)
    .with_context(|| format!("failed to parse flow file: {}", path.display()))
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      cancel.cancel();
    }
  });
}

fn read_payload_from_stdin<T: DeserializeOwned>() -> Result<T> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    bail!("expected a JSON payload on stdin");
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;
  serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
}
