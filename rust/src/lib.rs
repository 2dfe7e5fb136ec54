pub mod caption_client;
pub mod caption_text;
pub mod clipboard;
pub mod config_store;
pub mod controller;
pub mod error;
pub mod history;
pub mod keywords;
pub mod main_ui_html;
pub mod path_utils;
pub mod server;
