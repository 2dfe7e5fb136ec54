#![cfg_attr(
    all(target_os = "windows", not(debug_assertions)),
    windows_subsystem = "windows"
)]

use anyhow::{Context, Result};
use image_caption_studio::caption_client::CaptionClient;
use image_caption_studio::clipboard::ClipboardChain;
use image_caption_studio::config_store::ConfigStore;
use image_caption_studio::controller::UploadController;
use image_caption_studio::path_utils::{config_arg, get_base_dir, resolve_config_path};
use image_caption_studio::server::{AppServer, AppState};
use std::sync::Arc;

#[cfg(target_os = "windows")]
mod windows_app;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let base_dir = get_base_dir();
    let config_path = resolve_config_path(config_arg(std::env::args().skip(1)), &base_dir);
    let config = ConfigStore::new(config_path.clone())
        .with_context(|| format!("config error: {}", config_path.display()))?;

    let client = CaptionClient::new(&config.caption_endpoint(), config.request_timeout())?;
    log::info!("caption endpoint: {}", client.endpoint());

    let state = Arc::new(AppState::new(
        UploadController::new(config.controller_settings()),
        client,
        Box::new(ClipboardChain::system()),
    ));
    let server = AppServer::start(state, config.server_port())
        .context("failed to start caption server")?;

    run(server)
}

#[cfg(target_os = "windows")]
fn run(server: AppServer) -> Result<()> {
    windows_app::run(server)
}

#[cfg(not(target_os = "windows"))]
fn run(mut server: AppServer) -> Result<()> {
    println!("Open http://127.0.0.1:{}/ in a browser. Press Ctrl+C to stop.", server.port());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("failed to wait for Ctrl+C")?;

    log::info!("shutting down");
    server.stop();
    Ok(())
}
