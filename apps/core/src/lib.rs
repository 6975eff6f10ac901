pub mod api;
pub mod config;
pub mod fuzzy;
pub mod history_store;
pub mod host;
pub mod i18n;
pub mod input_hook;
pub mod keyboard_hook;
pub mod logging;
pub mod manifest;
pub mod mediator;
pub mod model;
pub mod presentation;
pub mod provider;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod save;
