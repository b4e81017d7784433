use callkeep::config::Config;
use callkeep::domain::call::Handle;
use callkeep::domain::shared::CallId;
use callkeep::infrastructure::authority::MemoryAuthority;
use callkeep::interface::command::CommandHandler;
use callkeep::{CallRegistry, CallSpec, RegistryOptions};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting callkeep");
    info!("Configuration loaded: {:?}", config);

    // Wire the authority and registry
    let authority = Arc::new(MemoryAuthority::new(Duration::from_millis(
        config.authority.latency_ms,
    )));
    let registry = CallRegistry::new(authority.clone(), RegistryOptions::from(&config.registry));
    let follower = registry.follow(authority.subscribe());

    // Log every change with the current call count
    let mut changes = registry.subscribe();
    let observer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            while changes.recv().await.is_ok() {
                info!("Calls changed: {} in registry", registry.len());
            }
        })
    };

    demo_call_lifecycle(&registry, &authority, &config).await?;
    demo_commands(&registry, &authority).await?;

    info!("Shutting down...");
    follower.abort();
    observer.abort();

    Ok(())
}

/// Walk one outgoing call through its whole lifecycle
async fn demo_call_lifecycle(
    registry: &CallRegistry,
    authority: &MemoryAuthority,
    config: &Config,
) -> anyhow::Result<()> {
    info!("=== Call Lifecycle Demo ===");

    let spec = CallSpec::new(Handle::phone_number("+15551234")).with_caller_name("Alice");
    let call = registry.start_call(spec).await?;
    info!("Call {} started, status: {}", call.id, call.status);

    // Wait for the deferred connected report
    tokio::time::sleep(Duration::from_millis(config.registry.connect_report_delay_ms + 100)).await;
    if let Some(call) = registry.lookup(call.id) {
        info!("Call {} status: {}", call.id, call.status);
    }

    registry.request_set_hold(call.id, true).await?;
    info!("Call held");
    registry.request_set_hold(call.id, false).await?;
    info!("Call resumed");
    registry.request_set_mute(call.id, true).await?;
    info!("Call muted");

    registry.request_end(call.id).await?;
    info!("Call ended, still present: {}", registry.lookup(call.id).is_some());

    // A remote hang-up reaches the registry through the authority's events
    let incoming = registry
        .report_incoming_call(CallSpec::new(Handle::email("bob@example.com")).with_video(true))
        .await?;
    authority.answer_remotely(incoming.id).await;
    authority.hang_up_remotely(incoming.id).await;

    info!("=== Call Lifecycle Demo Complete ===");
    Ok(())
}

/// Drive the registry through the key-value command surface
async fn demo_commands(registry: &CallRegistry, authority: &MemoryAuthority) -> anyhow::Result<()> {
    info!("=== Command Demo ===");
    let handler = CommandHandler::new(registry.clone());

    let started = handler
        .handle_json(json!({
            "method": "startCall",
            "args": { "handle": "+15559876", "handleType": "number", "callerName": "Carol" }
        }))
        .await?;
    info!("startCall -> {}", started);

    // A call placed outside the registry shows up with its id only
    authority
        .observe_external_call(CallId::new(), false)
        .await;
    let active = handler.handle_json(json!({ "method": "activeCalls" })).await?;
    info!("activeCalls -> {}", active);

    let ended = handler.handle_json(json!({ "method": "endAllCalls" })).await?;
    info!("endAllCalls -> {}", ended);

    info!("=== Command Demo Complete ===");
    Ok(())
}
