//! Client for an external consensus-backed coordination service.
//!
//! Every node of a distributed cluster uses this crate to talk to the
//! metadata service: session establishment with endpoint failover,
//! timeout-bounded request dispatch, one-shot watches, atomic
//! multi-operation transactions, and bulk subtree deletion.
//!
//! The wire protocol lives outside this crate: the real transport is
//! plugged in through the [`api::Connect`] seam, and an in-memory double
//! ([`api::TestKeeper`]) implements the same [`api::KeeperConnection`]
//! interface for tests.
//!
//! ## Usage
//!
//! ```ignore
//! use keeper_client::{Keeper, KeeperConfig, CreateMode, TxnRequest};
//!
//! let config = KeeperConfig::from_toml_file(path)?;
//! let keeper = Keeper::with_connector(config, transport).await?;
//!
//! keeper.create("/tables/t1", payload, CreateMode::Persistent).await?;
//! let (data, stat) = keeper.get("/tables/t1").await?;
//!
//! // Expected negative outcomes as values, not errors:
//! let code = keeper.try_set("/tables/t1", new_payload, stat.version).await?;
//!
//! // All-or-nothing batches:
//! keeper.multi(vec![
//!     TxnRequest::check("/tables", 0),
//!     TxnRequest::create("/tables/t2", payload2, CreateMode::Persistent),
//! ]).await?;
//! ```

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod hosts;
pub mod keeper;
pub mod paths;
pub mod types;

pub use config::Implementation;
pub use config::KeeperConfig;
pub use config::NodeConfig;
pub use error::ErrorCode;
pub use error::KeeperError;
pub use hosts::LoadBalancing;
pub use keeper::Keeper;
pub use keeper::PendingOp;
pub use keeper::WaitCondition;
pub use types::CreateMode;
pub use types::EventKind;
pub use types::Stat;
pub use types::TxnRequest;
pub use types::TxnResponse;
pub use types::WatchCallback;
pub use types::WatchEvent;
pub use types::ANY_VERSION;
