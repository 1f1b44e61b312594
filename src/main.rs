mod adapters;
mod config;
mod core;
mod error;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diffbrief")]
#[command(about = "Explain git diffs in plain language using LLM completions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true)]
    temperature: Option<f32>,

    #[arg(long, global = true)]
    max_tokens: Option<usize>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain a diff read from a file, stdin, or the working tree
    Explain {
        #[arg(long, help = "Path to diff file (reads from stdin if piped)")]
        diff: Option<PathBuf>,

        #[arg(long, help = "Stream the explanation as it is produced")]
        stream: bool,

        #[arg(
            short,
            long,
            conflicts_with = "stream",
            help = "Output file path (prints to stdout if not provided)"
        )]
        output: Option<PathBuf>,
    },
    /// Explain the changes introduced by a commit
    Commit {
        #[arg(help = "Commit hash or ref to explain")]
        commit: String,

        #[arg(short = 'C', long, default_value = ".", help = "Path to git repository")]
        directory: PathBuf,

        #[arg(long, help = "Stream the explanation as it is produced")]
        stream: bool,
    },
    /// Explain working-tree or staged changes
    Git {
        #[command(subcommand)]
        command: GitCommands,
    },
}

#[derive(Subcommand)]
enum GitCommands {
    Uncommitted {
        #[arg(long)]
        stream: bool,
    },
    Staged {
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = config::Config::load().unwrap_or_default();
    config.merge_with_cli(cli.model, cli.temperature, cli.max_tokens);
    config.normalize();

    match cli.command {
        Commands::Explain {
            diff,
            stream,
            output,
        } => explain_command(config, diff, stream, output).await,
        Commands::Commit {
            commit,
            directory,
            stream,
        } => commit_command(config, commit, directory, stream).await,
        Commands::Git { command } => git_command(config, command).await,
    }
}

async fn explain_command(
    config: config::Config,
    diff_path: Option<PathBuf>,
    stream: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let diff_content = if let Some(path) = diff_path {
        tokio::fs::read_to_string(path).await?
    } else if std::io::stdin().is_terminal() {
        let git = core::GitIntegration::new(".")?;
        git.get_uncommitted_diff()?
    } else {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    if core::diff::is_blank(&diff_content) {
        println!("No changes found");
        return Ok(());
    }

    run_analysis(config, diff_content, stream, output).await
}

async fn commit_command(
    config: config::Config,
    commit: String,
    directory: PathBuf,
    stream: bool,
) -> Result<()> {
    let git = core::GitIntegration::new(&directory)?;
    let diff_content = git.get_commit_diff(&commit)?;

    if core::diff::is_blank(&diff_content) {
        println!("Commit {} introduces no changes", commit);
        return Ok(());
    }

    info!("Explaining commit {}", commit);
    run_analysis(config, diff_content, stream, None).await
}

async fn git_command(config: config::Config, command: GitCommands) -> Result<()> {
    let git = core::GitIntegration::new(".")?;

    let (diff_content, stream) = match command {
        GitCommands::Uncommitted { stream } => {
            info!("Explaining uncommitted changes");
            (git.get_uncommitted_diff()?, stream)
        }
        GitCommands::Staged { stream } => {
            info!("Explaining staged changes");
            (git.get_staged_diff()?, stream)
        }
    };

    if core::diff::is_blank(&diff_content) {
        println!("No changes found");
        return Ok(());
    }

    run_analysis(config, diff_content, stream, None).await
}

async fn run_analysis(
    config: config::Config,
    diff_content: String,
    stream: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Using model: {}", config.model);
    let analyzer = build_analyzer(&config)?;

    if stream {
        return stream_analysis(&analyzer, diff_content).await;
    }

    let report = match analyzer.analyze(&diff_content).await {
        Ok(result) => core::report::render_report(&result),
        Err(err) => core::report::render_failure(&err),
    };

    if let Some(path) = output {
        tokio::fs::write(path, report).await?;
    } else {
        println!("{}", report);
    }

    Ok(())
}

async fn stream_analysis(analyzer: &core::DiffAnalyzer, diff_content: String) -> Result<()> {
    let mut events = analyzer.analyze_streaming(diff_content);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            core::StreamEvent::Fragment(text) => {
                print!("{}", text);
                stdout.flush()?;
            }
            core::StreamEvent::FilesChanged(files) => {
                print!("{}", core::report::render_files_section(&files));
                stdout.flush()?;
            }
            core::StreamEvent::Failed(err) => {
                println!("{}", core::report::render_failure(&err));
                return Ok(());
            }
            core::StreamEvent::Done => {
                println!();
            }
        }
    }

    Ok(())
}

fn build_analyzer(config: &config::Config) -> Result<core::DiffAnalyzer> {
    let model_config = adapters::llm::ModelConfig {
        model_name: config.model.clone(),
        api_key: config.api_key.clone(),
        base_url: config.base_url.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let adapter = adapters::llm::create_adapter(&model_config)?;

    let mut prompt_config = core::PromptConfig::default();
    prompt_config.max_diff_chars = config.max_diff_chars;
    if let Some(custom_prompt) = &config.system_prompt {
        prompt_config.system_prompt = custom_prompt.clone();
    }

    Ok(core::DiffAnalyzer::new(
        adapter,
        prompt_config,
        config.retry.to_policy(),
    ))
}
