mod auth_flow;
mod config_layering;
mod connection_register;
mod monitor;
mod profile_cache;
mod retry_engine;
