pub mod backend;
pub mod config_store;
pub mod defaults;
pub mod fs_util;
pub mod history;
pub mod ipc;
pub mod runtime_engine;
