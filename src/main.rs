//! Relay between Twitch chat and an automation webhook.
//!
//! Runs two long-lived tasks side by side: the chat client (receives
//! channel messages and forwards each to the webhook) and the control API
//! (health checks and outbound sends). A shutdown token, flipped by
//! SIGINT/SIGTERM or by either task exiting, drives coordinated teardown.

mod config;
mod server;
mod twitch;
mod webhook;

use log::{error, info};
use tokio::sync::watch;

use crate::server::ApiState;
use crate::twitch::ChatClient;
use crate::webhook::WebhookForwarder;

#[tokio::main]
async fn main() {
    // Fatal if required variables are missing; runs before any network I/O
    let settings = config::get_settings();

    env_logger::Builder::new()
        .parse_filters(&settings.log_level)
        .init();

    info!(
        "starting twitch relay: channel=#{} api={}:{}",
        settings.twitch_channel, settings.handler_host, settings.handler_port
    );

    let forwarder = match WebhookForwarder::new(
        settings.n8n_webhook_url.clone(),
        settings.handler_api_key.clone(),
    ) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("failed to build webhook client: {}", e);
            std::process::exit(1);
        }
    };

    let (client, handle) = ChatClient::new(settings, forwarder);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut chat_task = tokio::spawn(client.run(shutdown_rx.clone()));
    let api_state = ApiState {
        bot: Some(handle),
        settings,
    };
    let mut api_task = tokio::spawn(server::serve(api_state, shutdown_rx));

    let mut chat_done = false;
    let mut api_done = false;

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        result = &mut chat_task => {
            match result {
                Ok(()) => error!("chat client stopped"),
                Err(e) => error!("chat client task failed: {}", e),
            }
            chat_done = true;
        }
        result = &mut api_task => {
            match result {
                Ok(Ok(())) => error!("control api stopped"),
                Ok(Err(e)) => error!("control api error: {}", e),
                Err(e) => error!("control api task failed: {}", e),
            }
            api_done = true;
        }
    }

    // Safe to flip more than once; a repeated send is a no-op for receivers
    let _ = shutdown_tx.send(true);

    // Chat client releases its resources first, then the API server drains
    if !chat_done {
        if let Err(e) = chat_task.await {
            error!("chat client task failed during shutdown: {}", e);
        }
    }
    if !api_done {
        match api_task.await {
            Ok(Err(e)) => error!("control api error during shutdown: {}", e),
            Err(e) => error!("control api task failed during shutdown: {}", e),
            Ok(Ok(())) => {}
        }
    }

    info!("stopped");
}

/// Resolves when SIGINT or SIGTERM arrives. The handler only completes a
/// future; all teardown happens through the shutdown token.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
