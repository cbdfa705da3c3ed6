//! WebSocket JSON-RPC v2 client.
//!
//! A persistent duplex connection performing authenticated calls, channel
//! subscriptions, and server-initiated `subscription` demultiplexing onto
//! the event bus, with heartbeat and auto-reconnect watchers.

mod client;
mod models;
mod rpc;
mod subscriptions;

pub use client::{Client, Configuration, REAL_BASE_URL, TEST_BASE_URL};
pub use models::{
    AuthParams, AuthResponse, GetInstrumentsParams, SetHeartbeatParams, SubscribeParams,
    SubscriptionEvent, TestResponse,
};
pub use rpc::{NotificationHandler, RpcConnection, RpcFactory, WsRpcConnection};
