use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use storefront_gateway::config::{Cli, Command, ServeArgs, WatchArgs};
use storefront_gateway::route_gate::RouteGate;
use storefront_gateway::session::{
    AuthStore, GuardianConfig, HttpIdentityProvider, JsonFileStore, SessionGuardian, SignInData,
    TracingNavigator, UserResolver,
};
use storefront_gateway::state::AppState;
use storefront_gateway::{RateLimiterService, build_router, spawn_sweeper};

#[tokio::main]
async fn main() {
    init_tracing();

    // parse cli arguments
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Watch(args) => watch(args).await,
    };

    if let Err(e) = result {
        error!(error = %e, "exiting");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    if log_format.eq_ignore_ascii_case("pretty") {
        subscriber.init();
    } else {
        subscriber.json().init();
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // the origin's redirects go back to the browser untouched
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let rate_limiter = Arc::new(RateLimiterService::new());
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        rate_limiter.clone(),
        Duration::from_secs(args.sweep_interval),
        shutdown.clone(),
    );

    let resolver: Option<Arc<dyn UserResolver>> = match (&args.auth_url, &args.auth_api_key) {
        (Some(url), Some(key)) => {
            let provider = HttpIdentityProvider::new(client.clone(), url, key.clone());
            Some(Arc::new(provider) as Arc<dyn UserResolver>)
        }
        _ => None,
    };

    let state = Arc::new(AppState::new(client, &args.upstream, rate_limiter));
    let gate = Arc::new(RouteGate::with_protected(&args.protected));

    info!(
        port = args.port,
        upstream = %state.upstream_url,
        protected = ?gate.protected_prefixes,
        per_user_limits = resolver.is_some(),
        "gateway starting"
    );

    let app = build_router(state, gate, resolver);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let signal = shutdown.clone();
    // peer addresses key anonymous callers that send no forwarding headers
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        signal.cancel();
    })
    .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}

async fn watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let mut provider = HttpIdentityProvider::new(
        client,
        &args.identity.auth_url,
        args.identity.auth_api_key.clone(),
    );
    if let Some(url) = &args.redirect_to {
        provider = provider.with_redirect_to(url.clone());
    }
    let provider = Arc::new(provider);

    let store = AuthStore::hydrate(Arc::new(JsonFileStore::new(&args.store)));
    // pick the last session back up, like a reloaded browser tab
    provider.restore_session(store.snapshot().session);

    let config = GuardianConfig {
        check_interval: Duration::from_secs(args.check_interval),
        ..GuardianConfig::default()
    };
    let guardian = SessionGuardian::new(provider, Arc::new(TracingNavigator), store, config);
    guardian.start().await;

    if !guardian.snapshot().is_authenticated {
        match (args.email, args.password) {
            (Some(email), Some(password)) => {
                guardian.sign_in(SignInData { email, password }).await?;
            }
            _ => info!("no stored session and no credentials given; waiting for events"),
        }
    }

    let snapshot = guardian.snapshot();
    info!(
        phase = ?snapshot.phase,
        user_id = snapshot.user.as_ref().map(|u| u.id.as_str()).unwrap_or_default(),
        "session guardian running"
    );

    tokio::signal::ctrl_c().await?;
    guardian.shutdown().await;
    Ok(())
}
