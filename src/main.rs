use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookgrab::logging::init().context("init logging")?;

    let cli = bookgrab::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = bookgrab::config::PipelineConfig::load(cli.config.as_deref().map(Path::new))
        .context("load config")?;

    match cli.command {
        bookgrab::cli::Command::Download(args) => {
            bookgrab::download::run(args, &config)
                .await
                .context("download")?;
        }
        bookgrab::cli::Command::Check(args) => {
            bookgrab::reconcile::run(args, &config)
                .await
                .context("check")?;
        }
        bookgrab::cli::Command::Retry(args) => {
            bookgrab::retry::run(args, &config).await.context("retry")?;
        }
        bookgrab::cli::Command::Merge(args) => {
            tokio::task::block_in_place(|| bookgrab::merge::run(args, &config))
                .context("merge")?;
        }
        bookgrab::cli::Command::Cleanup(args) => {
            bookgrab::cleanup::run(args).context("cleanup")?;
        }
    }

    Ok(())
}
