pub mod build_index;
pub mod catalog;
pub mod doctor;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use lustre::config::LustreConfig;
use lustre::embedding::clip;

const VISUAL_MODEL_URL: &str =
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx";
const TEXTUAL_MODEL_URL: &str =
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/tokenizer.json";
const MASK_MODEL_URL: &str =
    "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx";

/// Download the CLIP towers, tokenizer, and (if enabled) the background mask model.
pub async fn model_download(config: &LustreConfig) -> Result<()> {
    let cache_dir = config.resolved_model_dir();
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let [visual_path, textual_path, tokenizer_path] = clip::model_files(&cache_dir);
    let mut downloads = vec![
        ("CLIP vision model (~350MB)", VISUAL_MODEL_URL, visual_path),
        ("CLIP text model (~250MB)", TEXTUAL_MODEL_URL, textual_path),
        ("tokenizer.json", TOKENIZER_URL, tokenizer_path),
    ];
    if config.background.enabled {
        downloads.push((
            "background mask model (~170MB)",
            MASK_MODEL_URL,
            cache_dir.join(&config.background.model_file),
        ));
    }

    for (label, url, dest) in downloads {
        if dest.exists() {
            println!("Already present: {}", dest.display());
            continue;
        }
        println!("Downloading {label}...");
        download_file(url, &dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Progress bar used by the long-running batch commands.
pub(crate) fn progress_bar(len: u64, what: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!("  {what} {{bar:40.cyan/blue}} {{pos}}/{{len}} ({{eta}})"))?
            .progress_chars("##-"),
    );
    Ok(pb)
}
