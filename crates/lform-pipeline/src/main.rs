//! Long-form video renderer binary.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info};

use lform_pipeline::{parse_script, AppConfig, AssetResolver, RenderPipeline};

fn usage() -> ! {
    eprintln!("usage: lform <script.txt> [config.yaml]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let script_path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => usage(),
    };
    let config_path = args.next().map(PathBuf::from);

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lform: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = lform_pipeline::logging::init(&config.log_level, Some(&config.log_file)) {
        eprintln!("lform: {e}");
        std::process::exit(1);
    }

    let script_text = match std::fs::read_to_string(&script_path) {
        Ok(text) => text,
        Err(e) => {
            error!("Cannot read script {}: {e}", script_path.display());
            std::process::exit(1);
        }
    };
    let document = match parse_script(&script_text) {
        Ok(document) => document,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let run_id = format!(
        "longform_{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    );

    let resolver = AssetResolver::new(&config.assets_dir);
    let pipeline = RenderPipeline::new(config.renderer.clone(), resolver);

    // Ctrl-C propagates as cooperative cancellation to all live workers.
    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, cancelling render");
            let _ = cancel.send(true);
        }
    });

    match pipeline.run(&document, &config.output_dir, &run_id).await {
        Ok(output) => {
            info!(
                "Done: {} ({:.2}s, {} scenes)",
                output.video_path.display(),
                output.total_duration,
                output.scene_count
            );
        }
        Err(e) if e.is_cancellation() => {
            info!("Render cancelled");
            std::process::exit(130);
        }
        Err(e) => {
            error!("Render failed: {e}");
            std::process::exit(1);
        }
    }
}
