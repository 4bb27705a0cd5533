//! HTTP RPC server for the node.
//!
//! One axum server carries the whole client surface: the method-dispatch
//! `/api/v1/rpc` endpoint, explorer reads over storage, settlement batch
//! inspection and resubmission, health and readiness probes, and the
//! Prometheus scrape endpoint.

mod handlers;
mod routes;
mod server;
mod state;
mod types;

pub use routes::create_router;
pub use server::{RpcServer, RpcServerConfig, RpcServerHandle};
pub use state::{ChainView, PendingRequests, RpcState, TransactionStatusCache};
pub use types::{RpcError, RpcRequest, RpcResponse};
