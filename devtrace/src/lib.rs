//! DevTrace - cross-frame network capture and tool coordination
//!
//! A coordinator actor keeps per-tab tool state consistent across
//! navigations, while frame agents capture page network calls and relay them
//! to one trace aggregator per tab.

pub mod actors;
pub mod api;
pub mod app_state;
pub mod browsing_data;
pub mod config;
pub mod interceptor;
pub mod page;
pub mod replay;
pub mod settings_store;
pub mod trace_log;
