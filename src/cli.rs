//! Command-line interface for serving and one-off predictions

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::attribution::Attribution;
use crate::model::ModelArtifact;
use crate::schema::FeatureSchema;
use crate::server::{run_server, ServerConfig};
use crate::service::{AttributionPayload, ExplanationService};

#[derive(Parser)]
#[command(name = "creditlens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explainable loan approval service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,

        /// Path to the trained model artifact
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Predict one applicant record from a JSON file
    Predict {
        /// Path to the trained model artifact
        #[arg(short, long)]
        model: PathBuf,

        /// JSON file with feature name → value
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Local surrogate explanation for one applicant record
    Lime {
        /// Path to the trained model artifact
        #[arg(short, long)]
        model: PathBuf,

        /// JSON file with feature name → value
        #[arg(short, long)]
        input: PathBuf,

        /// Sampling seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    model: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(model) = model {
        config.model_path = model;
    }
    run_server(config).await
}

fn load_service(model: &Path) -> anyhow::Result<(ExplanationService, FeatureSchema)> {
    let schema = FeatureSchema::loan_approval();
    let artifact = ModelArtifact::load(model, &schema)?;
    let service = ExplanationService::from_artifact(artifact, schema.clone())?;
    Ok((service, schema))
}

fn load_record(schema: &FeatureSchema, input: &Path) -> anyhow::Result<HashMap<String, f64>> {
    let raw: HashMap<String, Value> = serde_json::from_str(&std::fs::read_to_string(input)?)?;
    Ok(schema.encode(&raw)?)
}

pub fn cmd_predict(model: &Path, input: &Path) -> anyhow::Result<()> {
    let (service, schema) = load_service(model)?;
    let record = load_record(&schema, input)?;

    let response = service.predict(&record)?;
    let label = if response.prediction == 1 { "approved" } else { "rejected" };
    println!("prediction: {} ({})", response.prediction, label);
    println!("confidence: {:.2}", response.confidence);

    match response.shap_values {
        AttributionPayload::Values(values) => {
            println!("attributions (by |contribution|):");
            for (name, value) in Attribution::ranked(&values) {
                println!("  {:>+10.4}  {}", value, name);
            }
        }
        AttributionPayload::Failed { error } => {
            println!("attribution unavailable: {}", error);
        }
    }
    Ok(())
}

pub fn cmd_lime(model: &Path, input: &Path, seed: Option<u64>) -> anyhow::Result<()> {
    let (service, schema) = load_service(model)?;
    let record = load_record(&schema, input)?;

    let response = service.explain_locally(&record, seed)?;
    println!("local surrogate weights:");
    for (description, weight) in response.lime_explanation {
        println!("  {:>+10.4}  {}", weight, description);
    }
    Ok(())
}
