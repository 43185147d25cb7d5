//! JSON-RPC 2.0 protocol types and stdio transport

pub mod jsonrpc;
pub mod transport;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use transport::{StdioTransport, Transport};
