use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "warden-cli")]
#[command(about = "Management CLI for the http-warden admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show readiness, health and counters
    Status,
    /// List live connections
    Connections,
    /// List banned IPs
    Bans,
    /// Ban an IP
    Ban {
        ip: String,
        /// Ban length in minutes; permanent when omitted
        #[arg(short, long)]
        minutes: Option<u64>,
    },
    /// Lift a ban
    Unban { ip: String },
    /// List allowed route prefixes
    Routes,
    /// Allow a route prefix
    AddRoute { route: String },
    /// Remove an allowed route prefix
    RemoveRoute { route: String },
    /// Remove every allowed route
    ClearRoutes,
    /// List blacklisted keywords
    Keywords,
    /// Blacklist a keyword
    AddKeyword { keyword: String },
    /// Remove a blacklisted keyword
    RemoveKeyword { keyword: String },
    /// Drop a connection by socket id or every connection from an IP
    Disconnect {
        #[arg(long, conflicts_with = "ip", required_unless_present = "ip")]
        socket: Option<u64>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Drop every connection
    ClearUsers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string(), None),
        Commands::Connections => (Method::GET, "/admin/connections".to_string(), None),
        Commands::Bans => (Method::GET, "/admin/bans".to_string(), None),
        Commands::Ban { ip, minutes } => (
            Method::POST,
            "/admin/bans".to_string(),
            Some(json!({ "ip": ip, "minutes": minutes })),
        ),
        Commands::Unban { ip } => (Method::DELETE, format!("/admin/bans/{ip}"), None),
        Commands::Routes => (Method::GET, "/admin/routes".to_string(), None),
        Commands::AddRoute { route } => (
            Method::POST,
            "/admin/routes".to_string(),
            Some(json!({ "route": route })),
        ),
        Commands::RemoveRoute { route } => (
            Method::DELETE,
            "/admin/routes".to_string(),
            Some(json!({ "route": route })),
        ),
        Commands::ClearRoutes => (Method::POST, "/admin/routes/clear".to_string(), None),
        Commands::Keywords => (Method::GET, "/admin/keywords".to_string(), None),
        Commands::AddKeyword { keyword } => (
            Method::POST,
            "/admin/keywords".to_string(),
            Some(json!({ "keyword": keyword })),
        ),
        Commands::RemoveKeyword { keyword } => (
            Method::DELETE,
            "/admin/keywords".to_string(),
            Some(json!({ "keyword": keyword })),
        ),
        Commands::Disconnect { socket, ip } => (
            Method::POST,
            "/admin/disconnect".to_string(),
            Some(json!({ "socket": socket, "ip": ip })),
        ),
        Commands::ClearUsers => (Method::POST, "/admin/users/clear".to_string(), None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let res = request.send().await?;
    print_response(res).await?;

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
