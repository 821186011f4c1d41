use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "storefront-gateway")]
#[command(about = "Edge gateway and session keeper for the storefront")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the gateway in front of the storefront origin
    Serve(ServeArgs),
    /// Sign in and keep the session fresh until interrupted
    Watch(WatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    // Identity provider base url
    #[arg(long, env = "AUTH_URL")]
    pub auth_url: String,

    // Public api key sent with every provider call
    #[arg(long, env = "AUTH_API_KEY", hide_env_values = true)]
    pub auth_api_key: String,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Storefront origin the gateway forwards to
    #[arg(short, long, default_value = "localhost:3000")]
    pub upstream: String,

    // Protected page prefixes (comma-separated)
    // Example: "/account,/checkout,/wishlist"
    #[arg(long, default_value = "/account,/checkout,/wishlist")]
    pub protected: String,

    // Sweep interval for expired rate limit records, in seconds
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval: u64,

    // Identity provider, used to key per-user limits. Without it every
    // limit is keyed by client address.
    #[arg(long, env = "AUTH_URL")]
    pub auth_url: Option<String>,

    #[arg(long, env = "AUTH_API_KEY", hide_env_values = true)]
    pub auth_api_key: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    #[arg(long, env = "AUTH_EMAIL")]
    pub email: Option<String>,

    #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    // Where the session is kept between runs
    #[arg(long, default_value = "auth-storage.json")]
    pub store: PathBuf,

    // Where password-reset emails send the user back to
    #[arg(long)]
    pub redirect_to: Option<String>,

    // Session check interval in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub check_interval: u64,
}
