// =============================================================================
// Fusion Nexus — Main Entry Point
// =============================================================================
//
// Reads one fusion request (JSON) and prints the meta-fusion document followed
// by its audit record.  When no config file exists yet, the effective config
// (defaults or the chosen preset) is written to it.
//
//   fusion-nexus request.json
//   FUSION_REQUEST=request.json FUSION_PRESET=crisis fusion-nexus
// =============================================================================

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fusion_nexus::{DecisionRecord, EngineConfig, FusionRequest, MultiStrategyEngine, Preset};

const DEFAULT_CONFIG_PATH: &str = "fusion_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Fusion Nexus — starting");

    let config_path =
        std::env::var("FUSION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    // A preset from the environment replaces the file entirely.
    let config = match std::env::var("FUSION_PRESET") {
        Ok(name) => {
            let preset: Preset = name.parse()?;
            info!(preset = %preset, "Using configuration preset");
            EngineConfig::preset(preset)
        }
        Err(_) => EngineConfig::load(&config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            EngineConfig::default()
        }),
    };

    // ── 2. Request ───────────────────────────────────────────────────────
    let request_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FUSION_REQUEST").ok())
        .context("no request given: pass a path or set FUSION_REQUEST")?;

    let content = std::fs::read_to_string(&request_path)
        .with_context(|| format!("failed to read fusion request from {request_path}"))?;
    let request: FusionRequest = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse fusion request from {request_path}"))?;

    info!(
        client = %request.financial_data.client_id,
        scenarios = request.scenarios.len(),
        signals = request.signals.len(),
        "Fusion request loaded"
    );

    // ── 3. Fuse ──────────────────────────────────────────────────────────
    let engine = MultiStrategyEngine::new(config)?;
    let correlator = engine.correlator_for(&request).into_handle();

    let result = engine.synthesize_concurrent(&request, &correlator).await?;
    let record = DecisionRecord::new(request.financial_data.client_id.clone(), &result)?;

    // ── 4. Output ────────────────────────────────────────────────────────
    println!("{}", result.to_json()?);
    println!("{}", serde_json::to_string_pretty(&record)?);

    // First run: leave the effective config behind for editing. An existing
    // file is never overwritten.
    if !std::path::Path::new(&config_path).exists() {
        if let Err(e) = engine.config().save(&config_path) {
            error!(error = %e, path = %config_path, "Failed to save engine config");
        }
    }

    info!(
        decision_id = %record.id,
        consensus = %record.consensus_scenario,
        priority = %record.tactical_priority,
        "Fusion Nexus — done"
    );
    Ok(())
}
