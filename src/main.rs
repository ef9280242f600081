use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use rfmosaic::store::{DirTileStore, MemoryTileStore, TileStore};
use rfmosaic::viewport::{CanvasViewport, ViewportController};
use rfmosaic::{MosaicConfig, MosaicWorker, Viewport};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pan a viewport, capture tiles and stitch them into one image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline over a local image through a synthetic viewport
    Replay {
        /// Large source image to pan across
        #[arg(long)]
        source: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run the pipeline against a page in headless Chrome
    #[cfg(feature = "cdp")]
    Capture {
        /// Page to load before scanning
        #[arg(long)]
        url: String,
        /// Pan with window.scrollBy instead of mouse drags
        #[arg(long)]
        scroll: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Where to write the stitched PNG
    #[arg(long, default_value = "composite.png")]
    out: PathBuf,
    /// JSON configuration file (missing keys take defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Persist tiles and scan frames as PNGs under this directory
    #[arg(long)]
    tiles_dir: Option<PathBuf>,
    /// Override the viewport width
    #[arg(long)]
    width: Option<u32>,
    /// Override the viewport height
    #[arg(long)]
    height: Option<u32>,
    /// Override the fraction of the viewport advanced per pan
    #[arg(long)]
    step_fraction: Option<f64>,
}

impl CommonArgs {
    fn config(&self) -> Result<MosaicConfig> {
        let mut config = match &self.config {
            Some(path) => MosaicConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => MosaicConfig::default(),
        };
        if let Some(width) = self.width {
            config.viewport.width = width;
        }
        if let Some(height) = self.height {
            config.viewport.height = height;
        }
        if let Some(fraction) = self.step_fraction {
            config.step_fraction = fraction;
        }
        config.validate()?;
        Ok(config)
    }

    fn store(&self) -> rfmosaic::Result<Box<dyn TileStore>> {
        Ok(match &self.tiles_dir {
            Some(dir) => {
                let store = DirTileStore::open(dir)?;
                info!("writing tiles under {}", store.root().display());
                Box::new(store)
            }
            None => Box::new(MemoryTileStore::new()),
        })
    }
}

/// `RUST_LOG` when it parses, otherwise `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay { source, common } => {
            let config = common.config()?;
            let viewport = config.viewport;
            let out = common.out.clone();
            let worker = MosaicWorker::spawn(config, move || {
                let canvas = image::open(&source)?.to_rgba8();
                let controller: Box<dyn ViewportController> =
                    Box::new(CanvasViewport::new(canvas, viewport)?);
                Ok((controller, common.store()?))
            })
            .await?;
            finish(worker, &out, viewport).await
        }
        #[cfg(feature = "cdp")]
        Command::Capture { url, scroll, common } => {
            use rfmosaic::cdp::{CdpViewport, PanMode};

            let config = common.config()?;
            let viewport = config.viewport;
            let out = common.out.clone();
            let mode = if scroll { PanMode::Scroll } else { PanMode::Drag };
            let launch_config = config.clone();
            let worker = MosaicWorker::spawn(config, move || {
                let cdp = CdpViewport::launch(&launch_config, mode)?;
                cdp.navigate(&url)?;
                let controller: Box<dyn ViewportController> = Box::new(cdp);
                Ok((controller, common.store()?))
            })
            .await?;
            finish(worker, &out, viewport).await
        }
    }
}

/// Run the pipeline on `worker`, cancelling on Ctrl+C, and write the result.
async fn finish(worker: MosaicWorker, out: &Path, viewport: Viewport) -> Result<()> {
    let cancel = worker.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            cancel.cancel();
        }
    });

    info!("viewport {}x{}", viewport.width, viewport.height);
    let output = worker.run().await.context("mosaic run failed")?;
    info!(
        "grid {} x {}{}{}",
        output.grid.columns,
        output.grid.rows,
        if output.horizontal.fallback_used { ", horizontal fallback" } else { "" },
        if output.vertical.fallback_used { ", vertical fallback" } else { "" },
    );

    output
        .composite
        .save_png(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(
        "wrote {}x{} composite to {}",
        output.composite.width(),
        output.composite.height(),
        out.display()
    );

    worker.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn rust_log_debug_is_not_capped_at_info() {
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(Some("rfmosaic=trace")).max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn missing_rust_log_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }
}
