//! Background agent that keeps a per-day record of how a workstation is used: which windows are
//! in focus, which domains were browsed, how much was typed where and for how long the user was
//! away. The record is kept on disk and a minimized summary is periodically reported to a remote
//! collection service.

pub mod agent;
pub mod platform;
pub mod utils;
