use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cloudsvc::config::{data_dir, Profile};
use cloudsvc::service::request::BodyRepresentation;
use cloudsvc::{RequestSpec, ServiceClient, ServiceError, ServiceOptions};
use reqwest::Method;
use serde_json::Value;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Call a cloud service REST API
#[derive(Parser, Debug)]
#[command(name = "cloudsvc", version, about, long_about = None)]
struct Args {
    /// HTTP method (GET, POST, PUT, DELETE, ...)
    method: String,

    /// Path appended to the service URL
    path: String,

    /// Service URL
    #[arg(long)]
    url: Option<String>,

    /// Static API key (sent as a query parameter)
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// API key exchanged for IAM bearer tokens
    #[arg(long)]
    iam_api_key: Option<String>,

    /// Caller-managed IAM access token
    #[arg(long)]
    iam_access_token: Option<String>,

    /// IAM token endpoint
    #[arg(long)]
    iam_url: Option<String>,

    /// Service name to look up in VCAP_SERVICES
    #[arg(long)]
    service_name: Option<String>,

    /// Do not consult VCAP_SERVICES
    #[arg(long)]
    no_vcap: bool,

    /// Opt out of request logging for service learning
    #[arg(long)]
    opt_out: bool,

    /// Header as name:value
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Query parameter as key=value
    #[arg(short = 'q', long = "query")]
    params: Vec<String>,

    /// Request body; a JSON object is sent as structured fields, anything else verbatim
    #[arg(short = 'd', long)]
    data: Option<String>,

    /// Form field as key=value
    #[arg(short = 'F', long = "form")]
    form: Vec<String>,

    /// Ask for a JSON response
    #[arg(long)]
    accept_json: bool,

    /// Save url and credentials to the profile
    #[arg(long)]
    save: bool,

    /// Profile file (defaults to profile.json in the cloudsvc config directory)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Log level; RUST_LOG takes precedence when set
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("cloudsvc=error"),
            LogLevel::Warn => Some("cloudsvc=warn"),
            LogLevel::Info => Some("cloudsvc=info"),
            LogLevel::Debug => Some("cloudsvc=debug"),
            LogLevel::Trace => Some("cloudsvc=trace,reqwest=debug"),
        }
    }
}

/// Log to a file so output on stdout stays the response alone
fn setup_logging(level: LogLevel) -> Result<Option<WorkerGuard>> {
    let filter = match (EnvFilter::try_from_default_env(), level.directive()) {
        (Ok(filter), _) => filter,
        (Err(_), Some(directive)) => EnvFilter::new(directive),
        (Err(_), None) => return Ok(None),
    };

    let dir = data_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let log_path = dir.join("cloudsvc.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(path = %log_path.display(), "logging started");
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level)?;

    let mut options = ServiceOptions {
        url: args.url.clone(),
        api_key: args.api_key.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        iam_api_key: args.iam_api_key.clone(),
        iam_access_token: args.iam_access_token.clone(),
        iam_url: args.iam_url.clone(),
        vcap_services_name: args.service_name.clone(),
        use_vcap_services: !args.no_vcap,
        x_watson_learning_opt_out: args.opt_out,
    };

    let profile_path = args.profile.clone().unwrap_or_else(Profile::default_path);
    let profile = Profile::read(&profile_path).unwrap_or_else(|err| {
        tracing::warn!("Ignoring profile: {:#}", err);
        Profile::default()
    });
    profile.apply_to(&mut options);

    if args.save {
        Profile::from(&options).write(&profile_path)?;
    }

    let client = ServiceClient::new(options).context("Failed to initialize service client")?;
    let spec = build_request(&args)?;

    match client.request(spec).await {
        Ok(response) => {
            println!("{}", response.status);
            if !response.body.is_empty() {
                println!("{}", response.body);
            }
            Ok(())
        }
        Err(ServiceError::Api(err)) => {
            eprintln!("{}", err);
            if let Some(transaction_id) = &err.transaction_id {
                eprintln!("Transaction id: {}", transaction_id);
            }
            drop(log_guard);
            std::process::exit(1);
        }
        Err(err) => Err(err).context("Request failed"),
    }
}

fn build_request(args: &Args) -> Result<RequestSpec> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;

    let mut spec = RequestSpec::new(method, args.path.clone());

    for header in &args.headers {
        let (name, value) = split_pair(header, ':')?;
        spec = spec.header(name, value);
    }
    for param in &args.params {
        let (key, value) = split_pair(param, '=')?;
        spec = spec.query(key, value);
    }
    for field in &args.form {
        let (key, value) = split_pair(field, '=')?;
        spec = spec.form_field(key, value);
    }

    if let Some(data) = &args.data {
        spec = match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(fields)) => spec.json(fields),
            _ => spec.data(BodyRepresentation::Raw(data.clone())),
        };
    }

    if args.accept_json {
        spec = spec.accept_json();
    }

    Ok(spec)
}

fn split_pair(input: &str, separator: char) -> Result<(&str, &str)> {
    input
        .split_once(separator)
        .map(|(key, value)| (key.trim(), value.trim()))
        .with_context(|| format!("Expected '{}' in '{}'", separator, input))
}
