//! CLI `search`: run a query against the local index and print ranked hits.

use anyhow::{Context, Result};
use std::path::PathBuf;

use lustre::config::LustreConfig;
use lustre::context::{decode_query_image, SearchContext};
use lustre::search::Hit;

pub struct SearchArgs {
    pub image: Option<PathBuf>,
    pub text: Option<String>,
    pub top_k: Option<usize>,
    pub min_percent: Option<f64>,
    pub json: bool,
}

pub async fn search(config: &LustreConfig, args: SearchArgs) -> Result<()> {
    let context = SearchContext::initialize(config)?;
    let defaults = &config.search;

    let image = match &args.image {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(decode_query_image(&bytes)?)
        }
        None => None,
    };

    let hits = match (image, args.text) {
        (Some(image), Some(text)) => {
            let top_k = args.top_k.unwrap_or(defaults.hybrid_top_k);
            context.search_hybrid(image, text, top_k).await?
        }
        (Some(image), None) => {
            let top_k = args.top_k.unwrap_or(defaults.image_top_k);
            let min_percent = args.min_percent.unwrap_or(defaults.image_min_percent);
            context.search_image(image, top_k, min_percent).await?
        }
        (None, Some(text)) => {
            let top_k = args.top_k.unwrap_or(defaults.text_top_k);
            let min_percent = args.min_percent.unwrap_or(defaults.text_min_percent);
            context.search_text(text, top_k, min_percent).await?
        }
        (None, None) => anyhow::bail!("provide --image, --text, or both"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hits(&hits);
    }

    context.shutdown();
    Ok(())
}

fn print_hits(hits: &[Hit]) {
    if hits.is_empty() {
        println!("No matches.");
        return;
    }
    println!("{:>4}  {:>7}  {:<16}  {:<24}  Image", "Rank", "Match", "SKU", "Title");
    for hit in hits {
        println!(
            "{:>4}  {:>6.2}%  {:<16}  {:<24}  {}",
            hit.rank,
            hit.match_percent,
            hit.sku.as_deref().unwrap_or("-"),
            hit.title.as_deref().unwrap_or("-"),
            hit.image_path
        );
    }
}
