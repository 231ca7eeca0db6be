use std::sync::Arc;

use market_warden::clock::SystemClock;
use market_warden::config::{ChatDirectory, Config};
use market_warden::gateway::SerenityGateway;
use market_warden::moderation::ReconcileRequest;
use market_warden::store::Store;
use market_warden::{BOT_NAME, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = Config::from_env()?;
    let store = Store::load(config.data_file.clone()).await?;
    let chats = ChatDirectory::load(&config.chat_settings_file).await?;

    let http = Arc::new(serenity::Http::new(&config.token));
    let gateway = Arc::new(SerenityGateway::new(Arc::clone(&http), chats.clone()));
    let mut data = Data::new(
        store,
        gateway,
        Arc::new(SystemClock),
        chats,
        config.policy,
        config.admin_ids.clone(),
    );

    // Bring the platform back in line with the store before taking commands
    let reconciler = data.reconciler();
    let report = reconciler.startup().await;
    logging::log_console(format!(
        "Startup reconciliation: {} reapplied, {} exempted, {} dropped, {} deferred, {} skipped",
        report.reapplied, report.exempted, report.dropped, report.deferred, report.skipped
    ));
    let (reconcile_tx, sweep_task) = reconciler.spawn(config.policy.sweep_interval());
    data.set_reconcile_tx(reconcile_tx);

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console(format!(
                    "Registering {} commands for {BOT_NAME}",
                    framework.options().commands.len()
                ));
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .event_handler(handlers::Handler::new(data.clone()))
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    let shutdown_data = data.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutting down");
        shutdown_data
            .request_reconcile(ReconcileRequest::Shutdown)
            .await;
        if let Err(e) = shutdown_data.save().await {
            error!("Failed to save store on shutdown: {e}");
        }
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    if let Err(err) = client.start().await {
        error!("Error starting the bot: {err}");
    }

    data.request_reconcile(ReconcileRequest::Shutdown).await;
    if let Err(e) = sweep_task.await {
        error!("Sweep task ended abnormally: {e}");
    }
    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
