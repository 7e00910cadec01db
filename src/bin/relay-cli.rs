use clap::Parser;
use http_relay::client::RequestExecutor;
use http_relay::relay::{ContentCategory, HeaderEntry, HttpMethod, RequestDescriptor, ResponseEnvelope};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Send a request through an http-relay gateway", long_about = None)]
struct Cli {
    /// Target URL
    url: String,

    /// Gateway base URL
    #[arg(short, long, default_value = "http://localhost:5000")]
    gateway: String,

    /// HTTP method (ignored with --scrape)
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Header as `key:value`; repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Header kept in the request but not sent, as `key:value`; repeatable
    #[arg(long = "disable-header")]
    disabled_headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Render the page in a headless browser instead of forwarding the request
    #[arg(long)]
    scrape: bool,

    /// Print response headers
    #[arg(short, long)]
    include: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let descriptor = build_descriptor(&cli)?;
    let executor = RequestExecutor::new(&cli.gateway)?;
    tracing::debug!(gateway = %executor.endpoint(), url = %cli.url, scrape = cli.scrape, "Relaying");

    let pending = executor.submit(descriptor);
    let token = pending.token().clone();
    let envelope = tokio::select! {
        envelope = pending.settled() => envelope,
        _ = tokio::signal::ctrl_c() => {
            executor.cancel(&token).or_else(|| executor.visible()).ok_or("request vanished")?
        }
    };

    print_envelope(&envelope, cli.include);
    if envelope.error().is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn build_descriptor(cli: &Cli) -> Result<RequestDescriptor, Box<dyn std::error::Error>> {
    let mut builder = RequestDescriptor::builder(&cli.url);
    builder = if cli.scrape {
        builder.scrape()
    } else {
        builder.method(cli.method.parse::<HttpMethod>()?)
    };
    for raw in &cli.headers {
        builder = builder.header_entry(parse_header(raw)?);
    }
    for raw in &cli.disabled_headers {
        builder = builder.header_entry(parse_header(raw)?.disabled());
    }
    if let Some(data) = &cli.data {
        builder = builder.body(data.as_str());
    }
    Ok(builder.build()?)
}

fn parse_header(raw: &str) -> Result<HeaderEntry, String> {
    raw.split_once(':')
        .map(|(key, value)| HeaderEntry::new(key.trim(), value.trim()))
        .filter(|entry| !entry.key.is_empty())
        .ok_or_else(|| format!("Header must be `key:value`, got `{}`", raw))
}

fn print_envelope(envelope: &ResponseEnvelope, include_headers: bool) {
    if let Some((kind, message)) = envelope.error() {
        eprintln!("Error ({}): {}", kind, message);
        eprintln!("Time: {} ms", envelope.elapsed_ms);
        return;
    }

    match &envelope.status {
        Some(status) => println!("Status: {} {}", status.code, status.text),
        None => println!("Status: rendered"),
    }
    println!(
        "Time: {} ms  Size: {} B  Type: {}",
        envelope.elapsed_ms, envelope.byte_size, envelope.content_type
    );
    if include_headers {
        for (name, value) in &envelope.headers {
            println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
    }
    println!();
    let Some(payload) = envelope.payload() else {
        return;
    };
    let text = payload.render();
    match envelope.category() {
        ContentCategory::Markup => println!("--- markup, {} chars ---\n{}", text.chars().count(), text),
        ContentCategory::Structured => println!("--- json ---\n{}", text),
        ContentCategory::PlainText => println!("{}", text),
    }
}
