use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use markers::{build_markers, MarkerRecord, PipelineConfig, WateryTiles};
use reqwest::Client;
use sheets::{parse_table, SheetValues};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fetches marker sheet data and writes bucketed marker JSON")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the sheet and the watery table, run the pipeline, write buckets
    Fetch {
        /// Full URL of the sheet values endpoint; overrides --api-key/--sheet-id
        #[arg(long)]
        sheet_url: Option<String>,

        /// Google Sheets API key (use with --sheet-id)
        #[arg(long)]
        api_key: Option<String>,

        /// Spreadsheet id (use with --api-key)
        #[arg(long)]
        sheet_id: Option<String>,

        /// Values range to request
        #[arg(long, default_value = "A:Z")]
        range: String,

        /// URL of the watery-tile JSON table
        #[arg(long)]
        watery_url: String,

        /// Base URL for content-hashed icon files
        #[arg(long, default_value = "icons")]
        icon_base_url: String,

        #[arg(long, default_value_t = 2)]
        native_zoom: i32,

        /// Keep per-plane tile keys instead of folding every plane to 0
        #[arg(long)]
        no_fold: bool,

        /// Output path
        #[arg(long, default_value = "data/markers/buckets.json")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        Command::Fetch {
            sheet_url,
            api_key,
            sheet_id,
            range,
            watery_url,
            icon_base_url,
            native_zoom,
            no_fold,
            out,
        } => {
            let sheet_url = match (sheet_url, api_key, sheet_id) {
                (Some(url), _, _) => url,
                (None, Some(key), Some(id)) => format!(
                    "https://sheets.googleapis.com/v4/spreadsheets/{id}/values/{range}?key={key}"
                ),
                _ => {
                    return Err(
                        "either --sheet-url or both --api-key and --sheet-id are required".into(),
                    );
                }
            };

            let client = Client::new();
            info!(%sheet_url, %watery_url, "fetching marker data");

            // All-or-nothing: markers only exist if both fetches succeed.
            let (sheet, watery_raw) = tokio::try_join!(
                fetch_sheet(&client, &sheet_url),
                fetch_text(&client, &watery_url)
            )?;
            let watery = WateryTiles::from_json(&watery_raw)?;

            let groups = parse_table(&sheet.values);
            let config = PipelineConfig {
                native_zoom,
                fold_plane: !no_fold,
                icon_base_url,
                ..PipelineConfig::default()
            };
            let buckets = build_markers(&groups, &watery, &config)?;

            let out_map: BTreeMap<String, &[MarkerRecord]> = buckets
                .iter()
                .map(|(key, records)| (key.to_string(), records))
                .collect();
            let json = serde_json::to_string_pretty(&out_map)?;
            if let Some(parent) = out.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&out, json).await?;

            info!(
                records = buckets.total_records(),
                buckets = buckets.len(),
                out = %out.display(),
                "wrote marker buckets"
            );
        }
    }
    Ok(())
}

async fn fetch_sheet(client: &Client, url: &str) -> Result<SheetValues, Box<dyn std::error::Error>> {
    Ok(client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<SheetValues>()
        .await?)
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, Box<dyn std::error::Error>> {
    Ok(client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?)
}
