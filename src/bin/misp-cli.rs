use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use misp_fabric_bridge::fabric::topics;

#[derive(Parser)]
#[command(name = "misp-cli")]
#[command(about = "Management CLI for the MISP fabric bridge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "MISP_GATEWAY_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service, bridge and fabric status
    Status,
    /// Invoke a MISP API method through the fabric
    Invoke {
        /// API method name, e.g. get_event
        method: String,

        /// JSON object of keyword arguments
        #[arg(short, long, default_value = "")]
        payload: String,

        /// Unique id of the target service
        #[arg(short, long)]
        service_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/gateway/status", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Invoke {
            method,
            payload,
            service_id,
        } => {
            if !payload.is_empty() {
                // Fail early on malformed arguments.
                serde_json::from_str::<Value>(&payload)?;
            }
            let topic = topics::request_topic(service_id.as_deref(), &method);
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let res = client
                .post(format!("{}/gateway/request{}", base, topic))
                .headers(headers)
                .body(payload)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
