#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mapkit::geom::Point;
use mapkit::layer::Layer;
use mapkit::map::Map;
use mapkit::view::{Projection, View};
use mapprint::capabilities::Choice;
use mapprint::config::{CredentialsMode, PrintConfig, PrintMethod};
use mapprint::error::{ErrorCode, PrintError};
use mapprint::http::ReqwestTransport;
use mapprint::manager::{PrintManager, PrintOutput, V2Manager, V3Manager};
use serde_json::{Value, json};

const VIEW_WIDTH_PX: f64 = 1000.0;
const VIEW_HEIGHT_PX: f64 = 800.0;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{code}: {0}", code = .0.error_code())]
    Print(#[from] PrintError),
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("{kind} `{value}` is not offered by the print service")]
    Selection { kind: &'static str, value: String },
    #[error("--app is only supported by V3 services")]
    AppNeedsV3,
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Protocol {
    V2,
    V3,
}

#[derive(Parser, Debug)]
#[command(name = "print-cli", about = "Mapfish print service CLI")]
struct Cli {
    #[arg(long, env = "PRINT_URL")]
    url: String,

    #[arg(long, value_enum, env = "PRINT_PROTOCOL", default_value = "v3")]
    protocol: Protocol,

    /// V2 only: `get` builds a print link instead of creating the document.
    #[arg(long, env = "PRINT_METHOD", default_value = "post", value_parser = parse_method)]
    method: PrintMethod,

    #[arg(long, env = "PRINT_CREDENTIALS", default_value = "same-origin", value_parser = parse_credentials)]
    credentials: CredentialsMode,

    /// Extra request header, `Name=value`. Repeatable.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[arg(long, env = "PRINT_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    #[arg(long, env = "PRINT_POLL_INTERVAL_MS", default_value_t = 1_000)]
    poll_interval_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the print apps of a V3 service.
    Apps,
    /// Show what the service offers and what would be selected by default.
    Capabilities {
        #[arg(long)]
        app: Option<String>,
    },
    Print(PrintArgs),
}

#[derive(Args, Debug)]
struct PrintArgs {
    #[arg(long)]
    app: Option<String>,

    #[arg(long)]
    layout: Option<String>,

    #[arg(long)]
    format: Option<String>,

    #[arg(long)]
    dpi: Option<String>,

    /// Scale denominator (`25000`) or name (`1:25000`).
    #[arg(long)]
    scale: Option<String>,

    /// Clockwise degrees.
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Print center in EPSG:3857, `x,y`.
    #[arg(long, default_value = "0,0", allow_hyphen_values = true, value_parser = parse_point)]
    center: Point,

    /// View resolution in meters per pixel.
    #[arg(long, default_value_t = 1.0)]
    resolution: f64,

    /// WMS layer, `url#layer,layer`. Repeatable, bottom first.
    #[arg(long = "wms")]
    wms: Vec<String>,

    /// XYZ tile template, e.g. `https://tile.openstreetmap.org/{z}/{x}/{y}.png`. Repeatable.
    #[arg(long = "xyz")]
    xyz: Vec<String>,

    /// Print the request payload instead of sending it.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Download the document to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// A manager of either protocol behind one handle.
enum Manager {
    V2(V2Manager),
    V3(V3Manager),
}

impl Manager {
    fn as_dyn(&self) -> &dyn PrintManager {
        match self {
            Self::V2(manager) => manager,
            Self::V3(manager) => manager,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn PrintManager {
        match self {
            Self::V2(manager) => manager,
            Self::V3(manager) => manager,
        }
    }

    async fn print(&self, force_download: bool) -> Result<PrintOutput, PrintError> {
        match self {
            Self::V2(manager) => manager.print(force_download).await,
            Self::V3(manager) => manager.print(force_download).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli);

    match cli.command {
        Command::Apps => run_apps(&cli, config).await,
        Command::Capabilities { ref app } => run_capabilities(&cli, config, app.as_deref()).await,
        Command::Print(ref args) => run_print(&cli, config, args).await,
    }
}

fn build_config(cli: &Cli) -> PrintConfig {
    let mut config = PrintConfig::new(&cli.url)
        .with_method(cli.method)
        .with_credentials(cli.credentials)
        .with_timeout_ms(cli.timeout_ms)
        .with_poll_interval_ms(cli.poll_interval_ms);
    for (name, value) in &cli.headers {
        config = config.with_header(name, value);
    }
    config
}

async fn run_apps(cli: &Cli, config: PrintConfig) -> Result<(), CliError> {
    if cli.protocol != Protocol::V3 {
        return Err(CliError::AppNeedsV3);
    }
    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let manager = V3Manager::new(empty_map(1.0), config, transport);
    let apps = manager.load_print_apps().await?;
    print_json(&json!(apps))
}

async fn run_capabilities(cli: &Cli, config: PrintConfig, app: Option<&str>) -> Result<(), CliError> {
    let manager = connect(cli, config, empty_map(1.0), app).await?;
    let core = manager.as_dyn().core();
    let selected = json!({
        "layout": core.layout().map(|l| l.name.as_str()),
        "outputFormat": core.output_format().map(|f| f.name.as_str()),
        "dpi": core.dpi().map(|d| d.value),
        "scale": core.scale().map(|s| s.value),
    });
    let app = match &manager {
        Manager::V3(v3) => v3.app(),
        Manager::V2(_) => None,
    };
    print_json(&json!({
        "app": app,
        "layouts": core.layouts(),
        "outputFormats": core.output_formats(),
        "dpis": core.dpis(),
        "scales": core.scales(),
        "selected": selected,
    }))
}

async fn run_print(cli: &Cli, config: PrintConfig, args: &PrintArgs) -> Result<(), CliError> {
    let map = build_map(args)?;
    let mut manager = connect(cli, config, map, args.app.as_deref()).await?;
    apply_selections(manager.as_dyn_mut(), args)?;

    if args.dry_run {
        return print_json(&manager.as_dyn().print_payload()?);
    }

    let output = manager.print(args.output.is_some()).await?;
    if let (Some(path), Some(document)) = (&args.output, &output.document) {
        std::fs::write(path, document)?;
        tracing::info!(path = %path.display(), bytes = document.len(), "document written");
    }
    print_json(&json!({ "url": output.url }))
}

/// Build a manager for the configured protocol and initialize it.
async fn connect(cli: &Cli, config: PrintConfig, map: Map, app: Option<&str>) -> Result<Manager, CliError> {
    let transport = Arc::new(ReqwestTransport::new(&config)?);
    match cli.protocol {
        Protocol::V2 => {
            if app.is_some() {
                return Err(CliError::AppNeedsV3);
            }
            let mut manager = V2Manager::new(map, config, transport);
            manager.init(None).await?;
            Ok(Manager::V2(manager))
        }
        Protocol::V3 => {
            let mut manager = V3Manager::new(map, config, transport);
            manager.init().await?;
            if let Some(app) = app {
                if manager.app() != Some(app) {
                    manager.set_print_app(app).await?;
                }
            }
            Ok(Manager::V3(manager))
        }
    }
}

fn apply_selections(manager: &mut dyn PrintManager, args: &PrintArgs) -> Result<(), CliError> {
    if let Some(layout) = &args.layout {
        if !manager.set_layout(layout) {
            return Err(CliError::Selection { kind: "layout", value: layout.clone() });
        }
    }
    if let Some(format) = &args.format {
        if !manager.set_output_format(format) {
            return Err(CliError::Selection { kind: "output format", value: format.clone() });
        }
    }
    if let Some(dpi) = &args.dpi {
        if !manager.set_dpi(choice(dpi)) {
            return Err(CliError::Selection { kind: "dpi", value: dpi.clone() });
        }
    }
    if let Some(scale) = &args.scale {
        if !manager.set_scale(choice(scale)) {
            return Err(CliError::Selection { kind: "scale", value: scale.clone() });
        }
    }
    if let Some(rotation) = args.rotation {
        manager.core_mut().set_rotation(rotation);
    }
    Ok(())
}

/// Numbers select by value, anything else by name.
fn choice(raw: &str) -> Choice<'_> {
    match raw.parse::<f64>() {
        Ok(value) => Choice::Value(value),
        Err(_) => Choice::Name(raw),
    }
}

fn empty_map(resolution: f64) -> Map {
    Map::new(View::new(
        Point::new(0.0, 0.0),
        resolution,
        VIEW_WIDTH_PX,
        VIEW_HEIGHT_PX,
        Projection::web_mercator(),
    ))
}

fn build_map(args: &PrintArgs) -> Result<Map, CliError> {
    if args.resolution <= 0.0 {
        return Err(CliError::InvalidArg(format!("resolution must be positive, got {}", args.resolution)));
    }
    let mut map = empty_map(args.resolution);
    map.view.center = args.center;
    for (i, spec) in args.wms.iter().enumerate() {
        let (url, layers) = spec
            .split_once('#')
            .ok_or_else(|| CliError::InvalidArg(format!("--wms expects url#layer,layer, got `{spec}`")))?;
        let layers: Vec<&str> = layers.split(',').map(str::trim).filter(|l| !l.is_empty()).collect();
        if layers.is_empty() {
            return Err(CliError::InvalidArg(format!("--wms `{spec}` names no layers")));
        }
        map.add_layer(Layer::wms(format!("wms-{i}"), url, &layers));
    }
    for (i, template) in args.xyz.iter().enumerate() {
        map.add_layer(Layer::xyz(format!("xyz-{i}"), template.as_str()));
    }
    Ok(map)
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected Name=value, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw.split_once(',').ok_or_else(|| format!("expected x,y, got `{raw}`"))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("x `{x}`: {e}"))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("y `{y}`: {e}"))?;
    Ok(Point::new(x, y))
}

fn parse_method(raw: &str) -> Result<PrintMethod, String> {
    match raw.to_ascii_lowercase().as_str() {
        "get" => Ok(PrintMethod::Get),
        "post" => Ok(PrintMethod::Post),
        other => Err(format!("unknown method `{other}`, expected get or post")),
    }
}

fn parse_credentials(raw: &str) -> Result<CredentialsMode, String> {
    CredentialsMode::parse(raw).map_err(|e| e.to_string())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
